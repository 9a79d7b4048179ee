//! Playbook definitions: trigger descriptor and step tree (spec §3, §6).
//!
//! Accepts both the current step shape (`actionId`/`params`, `if`) and the
//! legacy shape (`uses`/`with`, `condition`) and normalizes both to [`Step`]
//! on deserialize (spec §9: "Two playbook schemas ... accept both on input,
//! normalize to the canonical shape at load").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::value::Value;

/// A playbook owned by an organization (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Playbook {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub trigger_type: String,
    pub is_active: bool,
    pub definition: PlaybookDefinition,
}

/// The directed sequence of steps plus a trigger descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaybookDefinition {
    pub trigger: TriggerDescriptor,
    #[schema(value_type = Vec<Object>)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct TriggerDescriptor {
    #[serde(rename = "type")]
    pub event_type: String,
    /// field → value, or field → [values] meaning "any of"
    #[serde(default)]
    #[schema(value_type = Object)]
    pub filter: BTreeMap<String, Value>,
    #[serde(rename = "where", default)]
    pub where_predicate: Option<String>,
}

/// Policy applied once a step's retries are exhausted (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    #[default]
    Abort,
    Continue,
    Rollback,
    Retry,
}

/// One step in a playbook's directed sequence.
///
/// Not `ToSchema` — its wire shape is the dual current/legacy form handled
/// by `RawStep`, not a direct field mapping utoipa could describe usefully.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    pub id: String,
    pub action_id: String,
    pub params: Value,
    pub condition: Option<String>,
    pub then: Vec<Step>,
    pub on_false: Vec<Step>,
    pub timeout_ms: u64,
    pub retries: u32,
    pub on_error: OnError,
}

pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum StepShapeError {
    #[error("step {id:?} has neither `actionId` nor legacy `uses`")]
    MissingAction { id: String },
}

/// Wire shape accepting both the current and legacy step forms. Never
/// constructed directly outside (de)serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    id: String,
    #[serde(default)]
    action_id: Option<String>,
    #[serde(default)]
    uses: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    with: Option<Value>,
    #[serde(default, alias = "condition")]
    r#if: Option<String>,
    #[serde(default)]
    then: Vec<Step>,
    #[serde(default)]
    r#else: Vec<Step>,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    on_error: OnError,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

impl TryFrom<RawStep> for Step {
    type Error = StepShapeError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let action_id = raw
            .action_id
            .or(raw.uses)
            .ok_or_else(|| StepShapeError::MissingAction { id: raw.id.clone() })?;
        let params = raw.params.or(raw.with).unwrap_or_else(Value::object);

        Ok(Step {
            id: raw.id,
            action_id,
            params,
            condition: raw.r#if,
            then: raw.then,
            on_false: raw.r#else,
            timeout_ms: raw.timeout_ms,
            retries: raw.retries,
            on_error: raw.on_error,
        })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        RawStep {
            id: step.id,
            action_id: Some(step.action_id),
            uses: None,
            params: Some(step.params),
            with: None,
            r#if: step.condition,
            then: step.then,
            r#else: step.on_false,
            timeout_ms: step.timeout_ms,
            retries: step.retries,
            on_error: step.on_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_shape() {
        let json = serde_json::json!({
            "id": "notify-team",
            "actionId": "notify_email",
            "params": {"to": "soc@org", "subject": "{{severity}} alert {{entityId}}"},
            "if": "severity == 'critical'",
            "timeoutMs": 30000,
            "retries": 2,
            "onError": "continue",
            "then": [],
            "else": []
        });
        let step: Step = serde_json::from_value(json).unwrap();
        assert_eq!(step.action_id, "notify_email");
        assert_eq!(step.condition.as_deref(), Some("severity == 'critical'"));
        assert_eq!(step.retries, 2);
        assert_eq!(step.on_error, OnError::Continue);
    }

    #[test]
    fn parses_legacy_shape() {
        let json = serde_json::json!({
            "id": "s1",
            "uses": "log_message",
            "with": {"message": "hi"},
            "condition": "severity == 'high'"
        });
        let step: Step = serde_json::from_value(json).unwrap();
        assert_eq!(step.action_id, "log_message");
        assert_eq!(step.condition.as_deref(), Some("severity == 'high'"));
        assert_eq!(step.timeout_ms, DEFAULT_STEP_TIMEOUT_MS);
        assert_eq!(step.on_error, OnError::Abort);
    }

    #[test]
    fn rejects_step_with_no_action() {
        let json = serde_json::json!({ "id": "s1" });
        let result: Result<Step, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn full_definition_round_trips() {
        let json = serde_json::json!({
            "trigger": {
                "type": "alert.created",
                "filter": { "severity": ["high", "critical"] },
                "where": "score >= 7"
            },
            "steps": [
                { "id": "s1", "actionId": "log_message", "params": {"message": "hi"} }
            ]
        });
        let def: PlaybookDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(def.trigger.event_type, "alert.created");
        assert_eq!(def.steps.len(), 1);
        let round = serde_json::to_value(&def).unwrap();
        let reparsed: PlaybookDefinition = serde_json::from_value(round).unwrap();
        assert_eq!(reparsed.steps[0].action_id, "log_message");
    }
}
