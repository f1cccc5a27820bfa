//! Demo workflows the operator binary can run.
//!
//! Each demo records its name under [`DEMO_KEY`] in the thread's state so that
//! `continue` and `history` can rebuild the right graph from a thread id alone.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde_json::json;
use stategraph::{
    Condition, ErrorStrategy, FieldKind, FieldSpec, FnNode, GraphConfig, Node, ParallelGroup,
    PartialState, RetryPolicy, RunContext, State, StateGraph, StateSchema, END, START,
};

/// State key naming the demo a thread was started with.
pub const DEMO_KEY: &str = "demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// `fetch -> transform -> store`.
    Linear,
    /// `prepare -> research{web, docs, code} -> summarize`, member errors collected.
    Fanout,
    /// `draft -> approve (suspends) -> publish | revise`.
    Approval,
}

impl Demo {
    pub fn name(&self) -> &'static str {
        match self {
            Demo::Linear => "linear",
            Demo::Fanout => "fanout",
            Demo::Approval => "approval",
        }
    }

    /// The demo a thread's state was started with, if it names a known one.
    pub fn of_state(state: &State) -> Option<Self> {
        state.get_as::<String>(DEMO_KEY)?.parse().ok()
    }

    /// Input for a fresh run: the demo name plus caller-supplied keys.
    pub fn input(&self, extra: PartialState) -> PartialState {
        let mut input = extra;
        input.set(DEMO_KEY, self.name());
        input
    }

    pub fn graph(&self, config: GraphConfig) -> StateGraph {
        let graph = StateGraph::new().with_schema(schema()).with_config(config);
        match self {
            Demo::Linear => linear(graph),
            Demo::Fanout => fanout(graph),
            Demo::Approval => approval(graph),
        }
    }
}

impl fmt::Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Demo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Demo::Linear),
            "fanout" => Ok(Demo::Fanout),
            "approval" => Ok(Demo::Approval),
            other => Err(format!("unknown demo {other:?}")),
        }
    }
}

fn schema() -> StateSchema {
    StateSchema::new()
        .field(DEMO_KEY, FieldSpec::new(FieldKind::String))
        .field("steps", FieldSpec::list())
        .field("count", FieldSpec::new(FieldKind::Integer).with_default(0))
        .field("findings", FieldSpec::list())
        .field("summary", FieldSpec::new(FieldKind::String).nullable())
        .field("approved", FieldSpec::new(FieldKind::Bool).with_default(false))
}

fn step(name: &str) -> PartialState {
    PartialState::new().with("steps", json!([name]))
}

fn linear(mut graph: StateGraph) -> StateGraph {
    graph
        .add_fn_node("fetch", |_s: State, _c: RunContext| async move {
            Ok(step("fetch").into())
        })
        .add_fn_node("transform", |state: State, _c: RunContext| async move {
            let count = state.get_as::<i64>("count").unwrap_or(0);
            Ok(step("transform").with("count", count + 1).into())
        })
        .add_fn_node("store", |_s: State, _c: RunContext| async move {
            Ok(step("store").into())
        })
        .add_edge(START, "fetch")
        .add_edge("fetch", "transform")
        .add_edge("transform", "store")
        .add_edge("store", END);
    graph
}

/// Parallel member reporting one finding for `source`.
fn research(source: &'static str) -> Arc<dyn Node> {
    Arc::new(FnNode::new(move |_s: State, _c: RunContext| async move {
        Ok(PartialState::new()
            .with("findings", json!([format!("{source}: ok")]))
            .into())
    }))
}

fn fanout(mut graph: StateGraph) -> StateGraph {
    graph
        .add_fn_node("prepare", |_s: State, _c: RunContext| async move {
            Ok(step("prepare").into())
        })
        .add_node("web", research("web"))
        .add_node("docs", research("docs"))
        .add_node("code", research("code"))
        .add_parallel_group(
            ParallelGroup::new("research", ["web", "docs", "code"])
                .with_error_strategy(ErrorStrategy::CollectErrors)
                .with_retry(RetryPolicy::new(1).with_backoff(Duration::from_millis(50), 2.0))
                .with_timeout(Duration::from_secs(10)),
        )
        .add_fn_node("summarize", |state: State, _c: RunContext| async move {
            let found = state
                .get("findings")
                .and_then(|v| v.as_array())
                .map_or(0, Vec::len);
            Ok(step("summarize")
                .with("summary", format!("{found} sources answered"))
                .into())
        })
        .add_edge(START, "prepare")
        .add_edge("prepare", "research")
        .add_edge("research", "summarize")
        .add_edge("summarize", END);
    graph
}

fn approval(mut graph: StateGraph) -> StateGraph {
    graph
        .add_fn_node("draft", |_s: State, _c: RunContext| async move {
            Ok(step("draft").with("summary", "release notes v1").into())
        })
        .add_fn_node("approve", |state: State, ctx: RunContext| async move {
            let answer = ctx.interrupt(json!({
                "question": "publish this draft?",
                "draft": state.get("summary").cloned(),
            }))?;
            let approved = answer
                .get("approved")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(step("approve").with("approved", approved).into())
        })
        .add_conditional_edges(
            "approve",
            Condition::sync(|state: &State| {
                if state.get_as::<bool>("approved").unwrap_or(false) {
                    "yes".to_string()
                } else {
                    "no".to_string()
                }
            }),
            Some(HashMap::from([
                ("yes".to_string(), "publish".to_string()),
                ("no".to_string(), "revise".to_string()),
            ])),
        )
        .add_fn_node("publish", |_s: State, _c: RunContext| async move {
            Ok(step("publish").into())
        })
        .add_fn_node("revise", |_s: State, _c: RunContext| async move {
            Ok(step("revise").into())
        })
        .add_edge(START, "draft")
        .add_edge("draft", "approve")
        .add_edge("publish", END)
        .add_edge("revise", END);
    graph
}
