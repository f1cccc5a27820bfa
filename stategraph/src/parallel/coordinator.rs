//! Runs one parallel group: spawn, join, cancel, merge.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{GraphError, NodeError, NodeFailure};
use crate::graph::executor::{ExecutionError, NodeExecutor};
use crate::graph::logging::{
    log_group_complete, log_group_start, log_member_error_tolerated, log_member_retry,
};
use crate::graph::RunContext;
use crate::state::{PartialState, State, StateSchema, ERRORS_KEY};

use super::circuit_breaker::CircuitBreaker;
use super::rate_limit::RateLimiter;
use super::{ErrorStrategy, JoinStrategy, ParallelGroup, RetryPolicy};

/// Result of a successful group run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupOutcome {
    /// Combined member updates (declaration order), plus `__errors__` under `CollectErrors`.
    pub update: PartialState,
    pub succeeded: Vec<String>,
    pub failed: Vec<NodeError>,
    /// Members stopped after the join completed; their work is discarded.
    pub cancelled: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// Every member settled.
    Drained,
    /// Join satisfied (`Any`, or `Quorum` after its grace).
    Joined,
    FailFast,
    Unreachable,
    TimedOut,
}

/// A group declaration plus the state it keeps across runs (breaker, start limiter).
pub(crate) struct GroupRunner {
    group: ParallelGroup,
    breaker: Option<CircuitBreaker>,
    limiter: Option<Arc<RateLimiter>>,
}

impl GroupRunner {
    pub(crate) fn new(group: ParallelGroup) -> Self {
        let breaker = group
            .circuit_breaker_threshold
            .map(|threshold| CircuitBreaker::new(threshold, group.circuit_breaker_cooldown));
        let limiter = group
            .rate_limit_per_second
            .and_then(RateLimiter::new)
            .map(Arc::new);
        Self {
            group,
            breaker,
            limiter,
        }
    }

    /// Runs every member on `snapshot` and returns the combined update.
    pub(crate) async fn run(
        &self,
        executor: &NodeExecutor,
        schema: &StateSchema,
        snapshot: &State,
        ctx: &RunContext,
    ) -> Result<GroupOutcome, GraphError> {
        let group = &self.group;
        let required = group.required();
        log_group_start(&group.name, group.members.len(), required);

        if let Some(breaker) = &self.breaker {
            if breaker.is_open() {
                let mut failures: Vec<NodeError> = group
                    .members
                    .iter()
                    .map(|m| NodeError::new(m, NodeFailure::CircuitOpen))
                    .collect();
                return Err(match group.error_strategy {
                    ErrorStrategy::FailFast if !failures.is_empty() => {
                        GraphError::Node(failures.remove(0))
                    }
                    _ => GraphError::GroupFailed {
                        group: group.name.clone(),
                        required,
                        succeeded: 0,
                        failures,
                    },
                });
            }
        }

        let result = self.run_members(executor, schema, snapshot, ctx).await;
        if let Some(breaker) = &self.breaker {
            match &result {
                Ok(_) => breaker.record_success(),
                Err(_) => breaker.record_failure(),
            }
        }
        result
    }

    async fn run_members(
        &self,
        executor: &NodeExecutor,
        schema: &StateSchema,
        snapshot: &State,
        ctx: &RunContext,
    ) -> Result<GroupOutcome, GraphError> {
        let group = &self.group;
        let n = group.members.len();
        let required = group.required();
        let deadline = group.timeout.map(|t| Instant::now() + t);
        let semaphore = group
            .max_in_flight
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        let attempts: Vec<Arc<AtomicU32>> = (0..n).map(|_| Arc::new(AtomicU32::new(0))).collect();

        let mut tasks: JoinSet<(usize, Result<PartialState, NodeFailure>)> = JoinSet::new();
        for (index, member) in group.members.iter().enumerate() {
            let member_run = MemberRun {
                executor: executor.clone(),
                group: group.name.clone(),
                member: member.clone(),
                ctx: ctx.for_node(member, None),
                retry: group.retry,
                semaphore: semaphore.clone(),
                limiter: self.limiter.clone(),
                attempts: Arc::clone(&attempts[index]),
            };
            let state = snapshot.clone();
            tasks.spawn(async move { (index, member_run.run(state).await) });
        }

        let mut settled: Vec<Option<Result<PartialState, NodeFailure>>> =
            (0..n).map(|_| None).collect();
        let mut successes = 0usize;
        let mut failures = 0usize;
        let mut grace_until: Option<Instant> = None;
        let mut first_failure: Option<NodeError> = None;

        let stop = loop {
            let wake = match (deadline, grace_until) {
                (Some(d), Some(g)) => Some(d.min(g)),
                (d, g) => d.or(g),
            };
            let joined = match wake {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) if grace_until == Some(at) => break Stop::Joined,
                    Err(_) => break Stop::TimedOut,
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = joined else {
                break Stop::Drained;
            };
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(group = %group.name, error = %e, "member task did not complete");
                    continue;
                }
            };
            match result.as_ref().err().cloned() {
                None => successes += 1,
                Some(cause) => {
                    failures += 1;
                    if group.error_strategy == ErrorStrategy::FailFast {
                        first_failure = Some(NodeError::new(&group.members[index], cause));
                        settled[index] = Some(result);
                        break Stop::FailFast;
                    }
                }
            }
            settled[index] = Some(result);

            if successes >= required {
                match group.join {
                    JoinStrategy::All => {}
                    JoinStrategy::Any => break Stop::Joined,
                    JoinStrategy::Quorum(_) if group.quorum_grace.is_zero() => break Stop::Joined,
                    JoinStrategy::Quorum(_) => {
                        grace_until.get_or_insert_with(|| Instant::now() + group.quorum_grace);
                    }
                }
            }
            let running = n - successes - failures;
            if successes + running < required {
                break Stop::Unreachable;
            }
        };

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        if let Some(error) = first_failure {
            return Err(GraphError::Node(error));
        }
        if stop == Stop::TimedOut
            && (group.error_strategy == ErrorStrategy::FailFast || successes < required)
        {
            return Err(GraphError::GroupTimeout {
                group: group.name.clone(),
                timeout: group.timeout.unwrap_or_default(),
            });
        }

        let mut outcome = GroupOutcome::default();
        let mut records: Vec<Value> = Vec::new();
        for (index, member) in group.members.iter().enumerate() {
            let failure = match settled[index].take() {
                Some(Ok(update)) => {
                    outcome.update = schema.combine(&outcome.update, &update)?;
                    outcome.succeeded.push(member.clone());
                    continue;
                }
                Some(Err(cause)) => cause,
                None if stop == Stop::TimedOut => {
                    NodeFailure::TimedOut(group.timeout.unwrap_or_default())
                }
                None => {
                    outcome.cancelled.push(member.clone());
                    continue;
                }
            };
            let error = NodeError::new(member, failure);
            records.push(json!({
                "node": member,
                "error": error.cause.to_string(),
                "attempts": attempts[index].load(Ordering::SeqCst),
            }));
            outcome.failed.push(error);
        }

        if matches!(stop, Stop::Unreachable) || successes < required {
            return Err(GraphError::GroupFailed {
                group: group.name.clone(),
                required,
                succeeded: successes,
                failures: outcome.failed,
            });
        }

        for error in &outcome.failed {
            log_member_error_tolerated(&group.name, error);
        }
        if group.error_strategy == ErrorStrategy::CollectErrors && !records.is_empty() {
            let errors = PartialState::new().with(ERRORS_KEY, Value::Array(records));
            outcome.update = schema.combine(&outcome.update, &errors)?;
        }
        log_group_complete(
            &group.name,
            outcome.succeeded.len(),
            outcome.failed.len(),
            outcome.cancelled.len(),
        );
        Ok(outcome)
    }
}

/// Everything one member task owns.
struct MemberRun {
    executor: NodeExecutor,
    group: String,
    member: String,
    ctx: RunContext,
    retry: RetryPolicy,
    semaphore: Option<Arc<Semaphore>>,
    limiter: Option<Arc<RateLimiter>>,
    attempts: Arc<AtomicU32>,
}

impl MemberRun {
    async fn run(self, snapshot: State) -> Result<PartialState, NodeFailure> {
        let mut retries = 0;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            let permit = match &self.semaphore {
                Some(semaphore) => Some(
                    Arc::clone(semaphore)
                        .acquire_owned()
                        .await
                        .map_err(|_| NodeFailure::Cancelled)?,
                ),
                None => None,
            };
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let ctx = self.ctx.clone().with_attempt(attempt);
            let result = self
                .executor
                .execute(&self.member, snapshot.clone(), &ctx)
                .await;
            drop(permit);

            let cause = match result {
                // a goto inside a group is ignored
                Ok(output) => return Ok(output.into_parts().0),
                Err(ExecutionError::Interrupted(_)) => return Err(NodeFailure::InterruptInGroup),
                Err(ExecutionError::Failed(error)) => error.cause,
            };
            if retries >= self.retry.max_retries {
                return Err(cause);
            }
            let delay = self.retry.delay(retries);
            log_member_retry(&self.group, &self.member, attempt + 1, delay);
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}
