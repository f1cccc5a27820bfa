//! Run context passed into nodes.
//!
//! Holds the runnable config, the id of the running node, the resume value (when the
//! node is re-entered after an interrupt) and the optional stream sender plus modes.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::interrupt::Interrupt;
use crate::memory::RunnableConfig;
use crate::stream::{StreamEvent, StreamMode};

#[derive(Clone, Debug)]
pub struct RunContext {
    /// Config for the current run (thread_id, max_steps).
    pub config: RunnableConfig,
    /// Node currently executing; empty outside a node.
    pub node_id: String,
    /// 1-based attempt number; above 1 only for retried parallel-group members.
    pub attempt: u32,
    /// Optional sender for streaming events.
    pub stream_tx: Option<mpsc::Sender<StreamEvent>>,
    /// Enabled stream modes.
    pub stream_mode: HashSet<StreamMode>,
    resume: Option<Value>,
}

impl RunContext {
    pub fn new(config: RunnableConfig) -> Self {
        Self {
            config,
            node_id: String::new(),
            attempt: 1,
            stream_tx: None,
            stream_mode: HashSet::new(),
            resume: None,
        }
    }

    pub(crate) fn with_stream(
        mut self,
        tx: mpsc::Sender<StreamEvent>,
        modes: HashSet<StreamMode>,
    ) -> Self {
        self.stream_tx = Some(tx);
        self.stream_mode = modes;
        self
    }

    /// Context for one node invocation.
    pub(crate) fn for_node(&self, node_id: &str, resume: Option<Value>) -> Self {
        Self {
            node_id: node_id.to_string(),
            attempt: 1,
            resume,
            ..self.clone()
        }
    }

    pub(crate) fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Suspends the run with `payload`, or returns the resume value when the node is
    /// being re-entered by `resume`.
    ///
    /// ```ignore
    /// let answer = ctx.interrupt(json!({"question": "approve?"}))?;
    /// ```
    pub fn interrupt(&self, payload: impl Into<Value>) -> Result<Value, Interrupt> {
        match &self.resume {
            Some(value) => Ok(value.clone()),
            None => Err(Interrupt::new(
                self.node_id.clone(),
                self.config.thread_id.clone(),
                payload.into(),
            )),
        }
    }

    pub fn resume_value(&self) -> Option<&Value> {
        self.resume.as_ref()
    }

    pub fn is_resuming(&self) -> bool {
        self.resume.is_some()
    }

    /// Sends a `Custom` stream event when the run is streaming in `Custom` mode.
    pub async fn emit(&self, value: impl Into<Value>) {
        if !self.stream_mode.contains(&StreamMode::Custom) {
            return;
        }
        if let Some(tx) = &self.stream_tx {
            let _ = tx.send(StreamEvent::Custom(value.into())).await;
        }
    }

    /// Sends an event if its mode is enabled; interrupts are always sent.
    pub(crate) async fn send(&self, event: StreamEvent) {
        let Some(tx) = &self.stream_tx else {
            return;
        };
        let wanted = match &event {
            StreamEvent::Values(_) => self.stream_mode.contains(&StreamMode::Values),
            StreamEvent::Updates { .. } => self.stream_mode.contains(&StreamMode::Updates),
            StreamEvent::Custom(_) => self.stream_mode.contains(&StreamMode::Custom),
            StreamEvent::Interrupt(_) | StreamEvent::Error { .. } => true,
        };
        if wanted {
            let _ = tx.send(event).await;
        }
    }
}
