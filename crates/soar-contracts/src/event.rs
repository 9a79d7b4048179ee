//! Security events flowing through the event bus and durable stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::value::Value;

/// The entity class an [`Event`] describes, and the class a [`Playbook`]
/// declares itself triggerable by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Alert,
    Incident,
    Playbook,
}

/// An immutable security event. `id` is the idempotent dedup key for
/// consumers of the durable stream (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub entity_id: i64,
    pub entity_type: EntityType,
    pub organization_id: i64,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub data: Value,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        entity_id: i64,
        entity_type: EntityType,
        organization_id: i64,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            entity_id,
            entity_type,
            organization_id,
            timestamp: Utc::now(),
            data,
        }
    }
}
