//! # Parallel groups
//!
//! A [`ParallelGroup`] is a named set of nodes the router treats as one target. Members
//! run concurrently on the same pre-group snapshot; their updates are combined with the
//! state reducers in declaration order and committed as a single step.
//!
//! | Knob                     | Effect                                                     |
//! |--------------------------|------------------------------------------------------------|
//! | [`JoinStrategy`]         | how many successes complete the group                      |
//! | [`ErrorStrategy`]        | whether a member failure fails, is recorded, or is dropped |
//! | [`RetryPolicy`]          | per-member retries with exponential backoff                |
//! | `timeout`                | group deadline; unfinished members count as failures       |
//! | `max_in_flight`          | concurrent member limit                                    |
//! | `rate_limit_per_second`  | spacing between member starts                              |
//! | circuit breaker          | fail fast for `cooldown` after repeated group failures     |
//! | `quorum_grace`           | extra time for stragglers once a quorum is reached         |

mod circuit_breaker;
mod coordinator;
mod rate_limit;
mod retry;

use std::time::Duration;

pub use coordinator::GroupOutcome;
pub use retry::RetryPolicy;

pub(crate) use coordinator::GroupRunner;

/// Size of a quorum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuorumSize {
    /// `ceil(f * members)`.
    Fraction(f64),
    Count(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum JoinStrategy {
    /// Wait for every member to settle.
    #[default]
    All,
    /// Complete on the first success; the rest are cancelled.
    Any,
    /// Complete once the quorum succeeded (plus `quorum_grace`); stragglers are cancelled.
    Quorum(QuorumSize),
}

impl JoinStrategy {
    /// Successes needed for the group to succeed, clamped to `1..=members`.
    ///
    /// `All` needs every member under `FailFast`; under the tolerant strategies it waits
    /// for every member but only needs one success.
    pub fn required(&self, members: usize, errors: ErrorStrategy) -> usize {
        let n = members.max(1);
        let raw = match self {
            JoinStrategy::All => match errors {
                ErrorStrategy::FailFast => n,
                ErrorStrategy::CollectErrors | ErrorStrategy::IgnoreErrors => 1,
            },
            JoinStrategy::Any => 1,
            JoinStrategy::Quorum(QuorumSize::Count(count)) => *count,
            JoinStrategy::Quorum(QuorumSize::Fraction(f)) => {
                // absorbs float error such as (2.0 / 3.0) * 3.0
                (f.max(0.0) * n as f64 - 1e-9).ceil() as usize
            }
        };
        raw.clamp(1, n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStrategy {
    /// First member failure cancels the others and fails the group with that error.
    #[default]
    FailFast,
    /// Failures are recorded under `__errors__` as `{node, error, attempts}`.
    CollectErrors,
    /// Failures are dropped.
    IgnoreErrors,
}

/// Declaration of a parallel group; registered with `StateGraph::add_parallel_group`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelGroup {
    pub name: String,
    pub members: Vec<String>,
    pub join: JoinStrategy,
    pub error_strategy: ErrorStrategy,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    pub max_in_flight: Option<usize>,
    pub rate_limit_per_second: Option<f64>,
    pub circuit_breaker_threshold: Option<u32>,
    pub circuit_breaker_cooldown: Duration,
    pub quorum_grace: Duration,
}

impl ParallelGroup {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
            join: JoinStrategy::default(),
            error_strategy: ErrorStrategy::default(),
            retry: RetryPolicy::default(),
            timeout: None,
            max_in_flight: None,
            rate_limit_per_second: None,
            circuit_breaker_threshold: None,
            circuit_breaker_cooldown: Duration::from_secs(30),
            quorum_grace: Duration::ZERO,
        }
    }

    pub fn with_join(mut self, join: JoinStrategy) -> Self {
        self.join = join;
        self
    }

    pub fn with_error_strategy(mut self, error_strategy: ErrorStrategy) -> Self {
        self.error_strategy = error_strategy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max);
        self
    }

    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        self.rate_limit_per_second = Some(per_second);
        self
    }

    pub fn with_circuit_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.circuit_breaker_threshold = Some(threshold);
        self.circuit_breaker_cooldown = cooldown;
        self
    }

    pub fn with_quorum_grace(mut self, grace: Duration) -> Self {
        self.quorum_grace = grace;
        self
    }

    /// Successes this group needs.
    pub fn required(&self) -> usize {
        self.join.required(self.members.len(), self.error_strategy)
    }
}
