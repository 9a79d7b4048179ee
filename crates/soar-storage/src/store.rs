//! `RelationalStore`: the one required collaborator the executor, trigger
//! engine and live channel read/write playbooks, bindings, executions and
//! audit logs through (spec §6 "Relational store").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use soar_contracts::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("playbook not found: {0}")]
    PlaybookNotFound(i64),
    #[error("execution not found: {0}")]
    ExecutionNotFound(i64),
    #[error("organization mismatch: row belongs to {actual}, caller is {expected}")]
    OrganizationMismatch { expected: i64, actual: i64 },
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Fields accepted when updating an execution's terminal state. Every field
/// besides `status` is optional because a transition to `running` carries
/// none of them.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStatusUpdate {
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub results: Option<Value>,
    pub error: Option<String>,
}

/// The relational store contract the core depends on (spec §6). Every
/// operation is atomic with respect to the row(s) it touches.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn get_playbook(&self, id: i64) -> Result<Option<Playbook>, StoreError>;

    async fn insert_execution(&self, execution: PlaybookExecution) -> Result<i64, StoreError>;

    async fn update_execution_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        update: ExecutionStatusUpdate,
    ) -> Result<(), StoreError>;

    async fn get_execution(&self, id: i64) -> Result<Option<PlaybookExecution>, StoreError>;

    /// Ordered by `priority` descending, ties broken by binding id ascending
    /// (spec §4.2 step 2).
    async fn list_active_bindings(
        &self,
        organization_id: i64,
        event_type: &str,
    ) -> Result<Vec<PlaybookBinding>, StoreError>;

    async fn append_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError>;

    async fn query_execution_audit_logs(
        &self,
        execution_id: i64,
        organization_id: i64,
    ) -> Result<Vec<AuditLogEntry>, StoreError>;
}
