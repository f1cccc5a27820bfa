//! JSON reports printed by the binary.

use serde_json::{json, Value};
use stategraph::{RunOutcome, ThreadStatus};

/// `{thread_id, status, state, interrupts}` for a finished or suspended run.
pub fn outcome_report(thread_id: Option<&str>, outcome: RunOutcome) -> Value {
    let status = if outcome.is_interrupted() {
        "interrupted"
    } else {
        "complete"
    };
    let interrupts = outcome.interrupts().to_vec();
    json!({
        "thread_id": thread_id,
        "status": status,
        "state": outcome.into_state(),
        "interrupts": interrupts,
    })
}

pub fn status_name(status: &ThreadStatus) -> &'static str {
    match status {
        ThreadStatus::Unknown => "unknown",
        ThreadStatus::Running => "idle",
        ThreadStatus::Suspended(_) => "suspended",
        ThreadStatus::Resuming { .. } => "resuming",
    }
}
