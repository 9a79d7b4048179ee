//! In-memory `RelationalStore`, grounded on the teacher's
//! `InMemoryWorkflowEventStore` (`parking_lot::RwLock<HashMap<...>>`, no
//! external dependencies) — used by tests and the `soar-server` binary when
//! no database is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use soar_contracts::prelude::*;

use crate::store::{ExecutionStatusUpdate, RelationalStore, StoreError};

#[derive(Default)]
pub struct InMemoryRelationalStore {
    playbooks: RwLock<HashMap<i64, Playbook>>,
    bindings: RwLock<HashMap<i64, PlaybookBinding>>,
    executions: RwLock<HashMap<i64, PlaybookExecution>>,
    audit_log: RwLock<Vec<AuditLogEntry>>,
    next_execution_id: AtomicI64,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_playbook(&self, playbook: Playbook) {
        self.playbooks.write().insert(playbook.id, playbook);
    }

    pub fn seed_binding(&self, binding: PlaybookBinding) {
        self.bindings.write().insert(binding.id, binding);
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn get_playbook(&self, id: i64) -> Result<Option<Playbook>, StoreError> {
        Ok(self.playbooks.read().get(&id).cloned())
    }

    async fn insert_execution(&self, mut execution: PlaybookExecution) -> Result<i64, StoreError> {
        let id = self.next_execution_id.fetch_add(1, Ordering::SeqCst) + 1;
        execution.id = id;
        self.executions.write().insert(id, execution);
        Ok(id)
    }

    async fn update_execution_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        update: ExecutionStatusUpdate,
    ) -> Result<(), StoreError> {
        let mut executions = self.executions.write();
        let execution = executions.get_mut(&id).ok_or(StoreError::ExecutionNotFound(id))?;
        execution.status = status;
        if let Some(completed_at) = update.completed_at {
            execution.completed_at = Some(completed_at);
        }
        if let Some(duration_ms) = update.duration_ms {
            execution.duration_ms = Some(duration_ms);
        }
        if let Some(results) = update.results {
            execution.results = results;
        }
        if update.error.is_some() {
            execution.error = update.error;
        }
        Ok(())
    }

    async fn get_execution(&self, id: i64) -> Result<Option<PlaybookExecution>, StoreError> {
        Ok(self.executions.read().get(&id).cloned())
    }

    async fn list_active_bindings(
        &self,
        organization_id: i64,
        event_type: &str,
    ) -> Result<Vec<PlaybookBinding>, StoreError> {
        let mut matching: Vec<PlaybookBinding> = self
            .bindings
            .read()
            .values()
            .filter(|b| b.is_active && b.organization_id == organization_id && b.event_type == event_type)
            .cloned()
            .collect();
        matching.sort_by_key(PlaybookBinding::ordering_key);
        Ok(matching)
    }

    async fn append_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        self.audit_log.write().push(entry);
        Ok(())
    }

    async fn query_execution_audit_logs(
        &self,
        execution_id: i64,
        organization_id: i64,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(self
            .audit_log
            .read()
            .iter()
            .filter(|entry| {
                entry.entity_type == AuditEntityType::Execution
                    && entry.entity_id == execution_id
                    && entry.organization_id == organization_id
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_binding(id: i64, priority: i32) -> PlaybookBinding {
        PlaybookBinding {
            id,
            organization_id: 1,
            event_type: "alert.created".to_string(),
            playbook_id: 1,
            predicate: None,
            priority,
            is_active: true,
        }
    }

    fn sample_execution() -> PlaybookExecution {
        PlaybookExecution {
            id: 0,
            playbook_id: 1,
            organization_id: 1,
            user_id: None,
            trigger_data: Value::object(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            results: Value::object(),
            error: None,
        }
    }

    #[tokio::test]
    async fn insert_execution_assigns_ids_and_updates_status() {
        let store = InMemoryRelationalStore::new();
        let id = store.insert_execution(sample_execution()).await.unwrap();
        assert!(id > 0);

        store
            .update_execution_status(
                id,
                ExecutionStatus::Completed,
                ExecutionStatusUpdate {
                    completed_at: Some(Utc::now()),
                    duration_ms: Some(42),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let execution = store.get_execution(id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.duration_ms, Some(42));
    }

    #[tokio::test]
    async fn update_unknown_execution_is_an_error() {
        let store = InMemoryRelationalStore::new();
        let result = store
            .update_execution_status(999, ExecutionStatus::Failed, ExecutionStatusUpdate::default())
            .await;
        assert!(matches!(result, Err(StoreError::ExecutionNotFound(999))));
    }

    #[tokio::test]
    async fn list_active_bindings_orders_by_priority_then_id() {
        let store = InMemoryRelationalStore::new();
        store.seed_binding(sample_binding(2, 5));
        store.seed_binding(sample_binding(1, 10));
        store.seed_binding(sample_binding(3, 10));

        let bindings = store.list_active_bindings(1, "alert.created").await.unwrap();
        let ids: Vec<i64> = bindings.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn inactive_bindings_are_excluded() {
        let store = InMemoryRelationalStore::new();
        let mut inactive = sample_binding(1, 10);
        inactive.is_active = false;
        store.seed_binding(inactive);

        let bindings = store.list_active_bindings(1, "alert.created").await.unwrap();
        assert!(bindings.is_empty());
    }

    #[tokio::test]
    async fn audit_log_query_filters_by_execution_and_org() {
        let store = InMemoryRelationalStore::new();
        store
            .append_audit_log(AuditLogEntry::new(
                AuditEntityType::Execution,
                7,
                "execution.started",
                1,
                AuditSource::System,
            ))
            .await
            .unwrap();
        store
            .append_audit_log(AuditLogEntry::new(
                AuditEntityType::Execution,
                8,
                "execution.started",
                1,
                AuditSource::System,
            ))
            .await
            .unwrap();

        let logs = store.query_execution_audit_logs(7, 1).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].entity_id, 7);
    }
}
