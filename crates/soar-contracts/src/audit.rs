//! Audit log entries recorded for playbook, execution, action and test
//! activity (spec §3, §4 `appendAuditLog`/`queryExecutionAuditLogs`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    Playbook,
    Execution,
    Action,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    System,
    User,
    Api,
}

/// One row of the audit trail. `action` is a dotted verb like
/// `execution.step.completed` or `playbook.updated`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub entity_type: AuditEntityType,
    pub entity_id: i64,
    pub action: String,
    pub user_id: Option<i64>,
    pub organization_id: i64,
    #[schema(value_type = Object)]
    pub details: Value,
    pub severity: AuditSeverity,
    pub source: AuditSource,
}

impl AuditLogEntry {
    pub fn new(
        entity_type: AuditEntityType,
        entity_id: i64,
        action: impl Into<String>,
        organization_id: i64,
        source: AuditSource,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            entity_type,
            entity_id,
            action: action.into(),
            user_id: None,
            organization_id,
            details: Value::object(),
            severity: AuditSeverity::Info,
            source,
        }
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}
