//! PostgreSQL `RelationalStore`, grounded on the teacher's
//! `PostgresWorkflowEventStore` (connection-pool-backed, `#[instrument]`'d
//! queries, `sqlx::query`/`query_as` with bound parameters throughout).

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{error, instrument};

use soar_contracts::prelude::*;

use crate::store::{ExecutionStatusUpdate, RelationalStore, StoreError};

#[derive(Clone)]
pub struct PostgresRelationalStore {
    pool: PgPool,
}

impl PostgresRelationalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RelationalStore for PostgresRelationalStore {
    #[instrument(skip(self))]
    async fn get_playbook(&self, id: i64) -> Result<Option<Playbook>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, name, trigger_type, is_active, definition
            FROM playbooks WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "get_playbook failed");
            StoreError::Database(e.to_string())
        })?;

        let Some(row) = row else { return Ok(None) };
        let definition: serde_json::Value = row
            .try_get("definition")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let definition: PlaybookDefinition =
            serde_json::from_value(definition).map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Some(Playbook {
            id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
            organization_id: row
                .try_get("organization_id")
                .map_err(|e| StoreError::Database(e.to_string()))?,
            name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
            trigger_type: row
                .try_get("trigger_type")
                .map_err(|e| StoreError::Database(e.to_string()))?,
            is_active: row
                .try_get("is_active")
                .map_err(|e| StoreError::Database(e.to_string()))?,
            definition,
        }))
    }

    #[instrument(skip(self, execution))]
    async fn insert_execution(&self, execution: PlaybookExecution) -> Result<i64, StoreError> {
        let trigger_data: serde_json::Value = execution.trigger_data.into();
        let results: serde_json::Value = execution.results.into();

        let row = sqlx::query(
            r#"
            INSERT INTO playbook_executions
                (playbook_id, organization_id, user_id, trigger_data, status, started_at, results)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(execution.playbook_id)
        .bind(execution.organization_id)
        .bind(execution.user_id)
        .bind(trigger_data)
        .bind(status_as_str(execution.status))
        .bind(execution.started_at)
        .bind(results)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "insert_execution failed");
            StoreError::Database(e.to_string())
        })?;

        row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))
    }

    #[instrument(skip(self, update))]
    async fn update_execution_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        update: ExecutionStatusUpdate,
    ) -> Result<(), StoreError> {
        let results: Option<serde_json::Value> = update.results.map(Into::into);

        let outcome = sqlx::query(
            r#"
            UPDATE playbook_executions
            SET status = $2,
                completed_at = COALESCE($3, completed_at),
                duration_ms = COALESCE($4, duration_ms),
                results = COALESCE($5, results),
                error = COALESCE($6, error)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status_as_str(status))
        .bind(update.completed_at)
        .bind(update.duration_ms)
        .bind(results)
        .bind(update.error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "update_execution_status failed");
            StoreError::Database(e.to_string())
        })?;

        if outcome.rows_affected() == 0 {
            return Err(StoreError::ExecutionNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_execution(&self, id: i64) -> Result<Option<PlaybookExecution>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, playbook_id, organization_id, user_id, trigger_data, status,
                   started_at, completed_at, duration_ms, results, error
            FROM playbook_executions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_execution(row)?))
    }

    #[instrument(skip(self))]
    async fn list_active_bindings(
        &self,
        organization_id: i64,
        event_type: &str,
    ) -> Result<Vec<PlaybookBinding>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, event_type, playbook_id, predicate, priority, is_active
            FROM playbook_bindings
            WHERE organization_id = $1 AND event_type = $2 AND is_active = true
            ORDER BY priority DESC, id ASC
            "#,
        )
        .bind(organization_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                Ok(PlaybookBinding {
                    id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
                    organization_id: row
                        .try_get("organization_id")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    event_type: row
                        .try_get("event_type")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    playbook_id: row
                        .try_get("playbook_id")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    predicate: row
                        .try_get("predicate")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    priority: row
                        .try_get("priority")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    is_active: row
                        .try_get("is_active")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, entry))]
    async fn append_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        let details: serde_json::Value = entry.details.into();
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (timestamp, entity_type, entity_id, action, user_id, organization_id, details, severity, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.timestamp)
        .bind(entity_type_as_str(entry.entity_type))
        .bind(entry.entity_id)
        .bind(entry.action)
        .bind(entry.user_id)
        .bind(entry.organization_id)
        .bind(details)
        .bind(severity_as_str(entry.severity))
        .bind(source_as_str(entry.source))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "append_audit_log failed");
            StoreError::Database(e.to_string())
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_execution_audit_logs(
        &self,
        execution_id: i64,
        organization_id: i64,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, entity_type, entity_id, action, user_id, organization_id,
                   details, severity, source
            FROM audit_log
            WHERE entity_type = 'execution' AND entity_id = $1 AND organization_id = $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(execution_id)
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let details: serde_json::Value =
                    row.try_get("details").map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(AuditLogEntry {
                    timestamp: row.try_get("timestamp").map_err(|e| StoreError::Database(e.to_string()))?,
                    entity_type: AuditEntityType::Execution,
                    entity_id: row.try_get("entity_id").map_err(|e| StoreError::Database(e.to_string()))?,
                    action: row.try_get("action").map_err(|e| StoreError::Database(e.to_string()))?,
                    user_id: row.try_get("user_id").map_err(|e| StoreError::Database(e.to_string()))?,
                    organization_id: row
                        .try_get("organization_id")
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    details: details.into(),
                    severity: parse_severity(
                        &row.try_get::<String, _>("severity").map_err(|e| StoreError::Database(e.to_string()))?,
                    ),
                    source: parse_source(
                        &row.try_get::<String, _>("source").map_err(|e| StoreError::Database(e.to_string()))?,
                    ),
                })
            })
            .collect()
    }
}

fn row_to_execution(row: sqlx::postgres::PgRow) -> Result<PlaybookExecution, StoreError> {
    let trigger_data: serde_json::Value =
        row.try_get("trigger_data").map_err(|e| StoreError::Database(e.to_string()))?;
    let results: serde_json::Value = row.try_get("results").map_err(|e| StoreError::Database(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(PlaybookExecution {
        id: row.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
        playbook_id: row.try_get("playbook_id").map_err(|e| StoreError::Database(e.to_string()))?,
        organization_id: row
            .try_get("organization_id")
            .map_err(|e| StoreError::Database(e.to_string()))?,
        user_id: row.try_get("user_id").map_err(|e| StoreError::Database(e.to_string()))?,
        trigger_data: trigger_data.into(),
        status: parse_status(&status),
        started_at: row.try_get("started_at").map_err(|e| StoreError::Database(e.to_string()))?,
        completed_at: row.try_get("completed_at").map_err(|e| StoreError::Database(e.to_string()))?,
        duration_ms: row.try_get("duration_ms").map_err(|e| StoreError::Database(e.to_string()))?,
        results: results.into(),
        error: row.try_get("error").map_err(|e| StoreError::Database(e.to_string()))?,
    })
}

fn status_as_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
        ExecutionStatus::Aborted => "aborted",
    }
}

fn parse_status(s: &str) -> ExecutionStatus {
    match s {
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        "cancelled" => ExecutionStatus::Cancelled,
        "aborted" => ExecutionStatus::Aborted,
        _ => ExecutionStatus::Running,
    }
}

fn entity_type_as_str(t: AuditEntityType) -> &'static str {
    match t {
        AuditEntityType::Playbook => "playbook",
        AuditEntityType::Execution => "execution",
        AuditEntityType::Action => "action",
        AuditEntityType::Test => "test",
    }
}

fn severity_as_str(s: AuditSeverity) -> &'static str {
    match s {
        AuditSeverity::Info => "info",
        AuditSeverity::Warning => "warning",
        AuditSeverity::Error => "error",
        AuditSeverity::Critical => "critical",
    }
}

fn parse_severity(s: &str) -> AuditSeverity {
    match s {
        "warning" => AuditSeverity::Warning,
        "error" => AuditSeverity::Error,
        "critical" => AuditSeverity::Critical,
        _ => AuditSeverity::Info,
    }
}

fn source_as_str(s: AuditSource) -> &'static str {
    match s {
        AuditSource::System => "system",
        AuditSource::User => "user",
        AuditSource::Api => "api",
    }
}

fn parse_source(s: &str) -> AuditSource {
    match s {
        "user" => AuditSource::User,
        "api" => AuditSource::Api,
        _ => AuditSource::System,
    }
}
