//! Live progress channel (spec §4.6 "Live Progress Channel"): per-step
//! status transitions and log lines broadcast out of the executor while an
//! execution is running, independent of the durably-persisted step record.

use chrono::{DateTime, Utc};
use serde::Serialize;
pub use soar_contracts::execution::LogLevel;
use soar_contracts::execution::StepStatus;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent {
    ExecutionStarted,
    StepStarted { step_id: String },
    StepStatusChanged { step_id: String, status: StepStatus },
    Log { step_id: Option<String>, level: LogLevel, message: String },
    ExecutionCompleted { status: String },
}

/// One `LiveEvent` scoped to the execution (and, transitively, the
/// organization and playbook) it belongs to, so subscribers can filter
/// without the executor needing to know who's listening.
#[derive(Debug, Clone, Serialize)]
pub struct LiveEnvelope {
    pub execution_id: i64,
    pub organization_id: i64,
    pub playbook_id: i64,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LiveEvent,
}

/// Best-effort broadcast of execution progress. A full channel or an
/// unwatched execution drops events silently; the step loop must never
/// block on a slow or absent subscriber.
#[derive(Clone)]
pub struct LiveChannel {
    sender: broadcast::Sender<LiveEnvelope>,
}

impl LiveChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEnvelope> {
        self.sender.subscribe()
    }

    pub fn emit(&self, envelope: LiveEnvelope) {
        // Drop is silent by design: nobody watching an execution is the
        // common case, not an error.
        let _ = self.sender.send(envelope);
    }
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds a `LiveChannel` to one execution so callers in the step loop don't
/// repeat the execution/org/playbook ids on every emit.
pub struct ExecutionLiveEmitter {
    channel: LiveChannel,
    execution_id: i64,
    organization_id: i64,
    playbook_id: i64,
}

impl ExecutionLiveEmitter {
    pub fn new(channel: LiveChannel, execution_id: i64, organization_id: i64, playbook_id: i64) -> Self {
        Self { channel, execution_id, organization_id, playbook_id }
    }

    pub fn emit(&self, event: LiveEvent) {
        self.channel.emit(LiveEnvelope {
            execution_id: self.execution_id,
            organization_id: self.organization_id,
            playbook_id: self.playbook_id,
            emitted_at: Utc::now(),
            event,
        });
    }

    pub fn log(&self, step_id: Option<String>, level: LogLevel, message: impl Into<String>) {
        self.emit(LiveEvent::Log { step_id, level, message: message.into() });
    }
}
