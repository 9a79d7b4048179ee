//! Inbound/outbound message catalog for the live progress channel (spec
//! §4.6). `playbook:*` and `test:trigger:started` events are named in the
//! catalog but never produced by this server — playbook CRUD and ad hoc test
//! triggers are out-of-scope external collaborators (spec §1); their events
//! would be published into the same channel by whatever owns that surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soar_contracts::execution::StepStatus;
use soar_engine::bus::{LiveEnvelope, LiveEvent};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Authenticate {
        token: String,
        #[allow(dead_code)]
        user_id: String,
        organization_id: i64,
        #[serde(default)]
        #[allow(dead_code)]
        permissions: Vec<String>,
    },
    Subscribe { room: String },
    Unsubscribe { room: String },
    Ping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[allow(clippy::large_enum_variant)]
pub enum OutboundMessage {
    Authenticated { organization_id: i64 },
    Subscribed { room: String },
    Unsubscribed { room: String },
    Pong,
    Error { message: String },
    Event {
        execution_id: Option<i64>,
        organization_id: i64,
        timestamp: DateTime<Utc>,
        payload: EventPayload,
    },
}

/// Spec §4.6's `execution:*` / `step:*` / `execution:log` broadcast shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    ExecutionStarted,
    ExecutionCompleted { status: String },
    ExecutionFailed { status: String },
    StepStarted { step_id: String },
    StepCompleted { step_id: String },
    StepFailed { step_id: String },
    StepUpdate { step_id: String, status: StepStatus },
    ExecutionLog { step_id: Option<String>, level: String, message: String },
}

/// Terminal statuses the executor can report that count as success for
/// `execution:completed` vs `execution:failed` framing.
const SUCCESSFUL_STATUSES: &[&str] = &["Completed"];

pub fn translate(envelope: LiveEnvelope) -> OutboundMessage {
    let payload = match envelope.event {
        LiveEvent::ExecutionStarted => EventPayload::ExecutionStarted,
        LiveEvent::StepStarted { step_id } => EventPayload::StepStarted { step_id },
        LiveEvent::StepStatusChanged { step_id, status } => match status {
            StepStatus::Completed => EventPayload::StepCompleted { step_id },
            StepStatus::Failed => EventPayload::StepFailed { step_id },
            other => EventPayload::StepUpdate { step_id, status: other },
        },
        LiveEvent::Log { step_id, level, message } => {
            EventPayload::ExecutionLog { step_id, level: format!("{level:?}").to_lowercase(), message }
        }
        LiveEvent::ExecutionCompleted { status } => {
            if SUCCESSFUL_STATUSES.contains(&status.as_str()) {
                EventPayload::ExecutionCompleted { status }
            } else {
                EventPayload::ExecutionFailed { status }
            }
        }
    };

    OutboundMessage::Event {
        execution_id: Some(envelope.execution_id),
        organization_id: envelope.organization_id,
        timestamp: envelope.emitted_at,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event: LiveEvent) -> LiveEnvelope {
        LiveEnvelope { execution_id: 1, organization_id: 7, playbook_id: 3, emitted_at: Utc::now(), event }
    }

    #[test]
    fn completed_status_maps_to_execution_completed() {
        let msg = translate(envelope(LiveEvent::ExecutionCompleted { status: "Completed".into() }));
        match msg {
            OutboundMessage::Event { payload: EventPayload::ExecutionCompleted { status }, .. } => {
                assert_eq!(status, "Completed");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn non_completed_status_maps_to_execution_failed() {
        let msg = translate(envelope(LiveEvent::ExecutionCompleted { status: "Aborted".into() }));
        match msg {
            OutboundMessage::Event { payload: EventPayload::ExecutionFailed { status }, .. } => {
                assert_eq!(status, "Aborted");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
