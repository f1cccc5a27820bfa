//! Layered router: picks what runs after a node or parallel group.
//!
//! Decision stack, first non-empty result wins:
//!
//! | Layer | Source                      | Failure                               |
//! |-------|-----------------------------|---------------------------------------|
//! | 0     | `Command::goto`             | unknown target is fatal               |
//! | 1     | static edge                 | unknown target is fatal               |
//! | 2     | conditional edge + path map | unmapped key / unknown target fatal   |
//! | 3     | routing rules (priority)    | unknown target is fatal               |
//! | 4     | intelligent router function | unknown target is fatal               |
//! | 5     | LLM router (bounded)        | timeout, error or bad target → skip   |
//! | 6     | configured default target   | unknown target is fatal               |
//! | -     | termination                 |                                       |
//!
//! A target naming a parallel group, or any member of one, resolves to the whole group.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::error::AgentError;
use crate::state::State;

use super::config::LlmRouterConfig;
use super::logging::{log_llm_router_fallback, log_route};
use super::state_graph::END;
use super::Next;

/// Routing failure; aborts the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("route from `{from}` targets unknown node or group `{target}`")]
    UnknownTarget { from: String, target: String },

    #[error("condition on `{from}` returned `{key}`, which is not in its path table")]
    UnmappedConditionKey { from: String, key: String },

    /// A persisted next target that no longer exists in the graph.
    #[error("cannot enter the graph at `{0}`")]
    InvalidEntry(String),
}

/// What runs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Node(String),
    Group(String),
    End,
}

impl RouteTarget {
    /// Node or group name; `None` for END.
    pub fn name(&self) -> Option<&str> {
        match self {
            RouteTarget::Node(id) | RouteTarget::Group(id) => Some(id),
            RouteTarget::End => None,
        }
    }
}

/// Which layer produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    Command,
    StaticEdge,
    ConditionalEdge,
    Rule,
    IntelligentRouter,
    LlmRouter,
    Default,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub target: RouteTarget,
    pub source: RouteSource,
}

/// Condition function of a conditional edge: `(state) -> key`, sync or async.
#[derive(Clone)]
pub enum Condition {
    Sync(Arc<dyn Fn(&State) -> String + Send + Sync>),
    Async(Arc<dyn Fn(State) -> BoxFuture<'static, String> + Send + Sync>),
}

impl Condition {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&State) -> String + Send + Sync + 'static,
    {
        Condition::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        Condition::Async(Arc::new(move |state| f(state).boxed()))
    }

    async fn evaluate(&self, state: &State) -> String {
        match self {
            Condition::Sync(f) => f(state),
            Condition::Async(f) => f(state.clone()).await,
        }
    }
}

/// Condition plus optional path table (key -> target). Without a table the key is the target.
#[derive(Clone)]
pub(crate) struct ConditionalEdge {
    pub(crate) condition: Condition,
    pub(crate) path_map: Option<HashMap<String, String>>,
}

/// `(state, raw run input) -> bool`.
pub type RulePredicate = Arc<dyn Fn(&State, Option<&Value>) -> bool + Send + Sync>;

/// Prioritised rule: evaluated in descending priority when `source` has no edge;
/// first true predicate wins, ties keep registration order.
#[derive(Clone)]
pub struct RoutingRule {
    pub source: String,
    pub target: String,
    pub priority: i32,
    predicate: RulePredicate,
}

impl RoutingRule {
    pub fn new<F>(
        source: impl Into<String>,
        predicate: F,
        target: impl Into<String>,
        priority: i32,
    ) -> Self
    where
        F: Fn(&State, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            target: target.into(),
            priority,
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, state: &State, input: Option<&Value>) -> bool {
        (self.predicate)(state, input)
    }
}

/// `(state, available targets) -> target`. Returning `None` defers to the next layer.
pub type IntelligentRouterFn = Arc<dyn Fn(&State, &[String]) -> Option<String> + Send + Sync>;

/// LLM-backed routing collaborator. Its answer is bounded by `LlmRouterConfig::timeout`
/// and checked against the available targets; any failure falls through.
#[async_trait]
pub trait LlmRouter: Send + Sync {
    async fn decide(
        &self,
        state: &State,
        available: &[String],
    ) -> Result<Option<String>, AgentError>;
}

#[derive(Clone, Default)]
pub(crate) struct Router {
    pub(crate) static_edges: HashMap<String, String>,
    pub(crate) conditional: HashMap<String, ConditionalEdge>,
    /// Sorted by descending priority.
    pub(crate) rules: Vec<RoutingRule>,
    pub(crate) intelligent: Option<IntelligentRouterFn>,
    pub(crate) llm: Option<Arc<dyn LlmRouter>>,
    pub(crate) llm_config: LlmRouterConfig,
    pub(crate) default_target: Option<String>,
    nodes: HashSet<String>,
    groups: HashSet<String>,
    group_of: HashMap<String, String>,
    available: Vec<String>,
}

impl Router {
    pub(crate) fn new(nodes: HashSet<String>, group_of: HashMap<String, String>) -> Self {
        let groups: HashSet<String> = group_of.values().cloned().collect();
        let mut available: Vec<String> = nodes
            .iter()
            .filter(|id| !group_of.contains_key(*id))
            .chain(groups.iter())
            .cloned()
            .collect();
        available.sort();
        available.push(END.to_string());
        Self {
            nodes,
            groups,
            group_of,
            available,
            ..Default::default()
        }
    }

    /// Sorts rules by descending priority, keeping registration order among equals.
    pub(crate) fn with_rules(mut self, mut rules: Vec<RoutingRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.rules = rules;
        self
    }

    /// Targets offered to the intelligent and LLM routers: ungrouped nodes, groups, END.
    #[cfg(test)]
    pub(crate) fn available(&self) -> &[String] {
        &self.available
    }

    pub(crate) fn resolve(&self, from: &str, target: &str) -> Result<RouteTarget, RoutingError> {
        if target == END {
            return Ok(RouteTarget::End);
        }
        if self.groups.contains(target) {
            return Ok(RouteTarget::Group(target.to_string()));
        }
        if self.nodes.contains(target) {
            return Ok(match self.group_of.get(target) {
                Some(group) => RouteTarget::Group(group.clone()),
                None => RouteTarget::Node(target.to_string()),
            });
        }
        Err(RoutingError::UnknownTarget {
            from: from.to_string(),
            target: target.to_string(),
        })
    }

    /// Resolves the next step after `from` (a node id, a group name or START).
    pub(crate) async fn route(
        &self,
        from: &str,
        state: &State,
        input: Option<&Value>,
        goto: Option<&Next>,
    ) -> Result<RouteDecision, RoutingError> {
        let decision = self.decide(from, state, input, goto).await?;
        log_route(from, &decision);
        Ok(decision)
    }

    async fn decide(
        &self,
        from: &str,
        state: &State,
        input: Option<&Value>,
        goto: Option<&Next>,
    ) -> Result<RouteDecision, RoutingError> {
        let decided = |target, source| Ok(RouteDecision { target, source });

        if let Some(next) = goto {
            let target = match next {
                Next::End => RouteTarget::End,
                Next::Node(id) => self.resolve(from, id)?,
            };
            return decided(target, RouteSource::Command);
        }
        if let Some(to) = self.static_edges.get(from) {
            return decided(self.resolve(from, to)?, RouteSource::StaticEdge);
        }
        if let Some(edge) = self.conditional.get(from) {
            let key = edge.condition.evaluate(state).await;
            let target = match &edge.path_map {
                Some(map) => map
                    .get(&key)
                    .ok_or_else(|| RoutingError::UnmappedConditionKey {
                        from: from.to_string(),
                        key: key.clone(),
                    })?
                    .as_str(),
                None => key.as_str(),
            };
            return decided(self.resolve(from, target)?, RouteSource::ConditionalEdge);
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| rule.source == from && rule.matches(state, input))
        {
            return decided(self.resolve(from, &rule.target)?, RouteSource::Rule);
        }
        if let Some(choose) = &self.intelligent {
            if let Some(target) = choose(state, &self.available) {
                return decided(
                    self.resolve(from, &target)?,
                    RouteSource::IntelligentRouter,
                );
            }
        }
        if let Some(target) = self.ask_llm(from, state).await {
            return decided(target, RouteSource::LlmRouter);
        }
        if let Some(target) = &self.default_target {
            return decided(self.resolve(from, target)?, RouteSource::Default);
        }
        decided(RouteTarget::End, RouteSource::Terminal)
    }

    async fn ask_llm(&self, from: &str, state: &State) -> Option<RouteTarget> {
        let llm = self.llm.as_ref()?;
        if !self.llm_config.enabled {
            return None;
        }
        let answer = tokio::time::timeout(
            self.llm_config.timeout,
            llm.decide(state, &self.available),
        )
        .await;
        match answer {
            Ok(Ok(Some(target))) if self.available.contains(&target) => {
                self.resolve(from, &target).ok()
            }
            Ok(Ok(Some(target))) => {
                log_llm_router_fallback(from, &format!("target `{target}` is not available"));
                None
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                log_llm_router_fallback(from, &e.to_string());
                None
            }
            Err(_) => {
                log_llm_router_fallback(from, "timed out");
                None
            }
        }
    }
}
