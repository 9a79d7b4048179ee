//! Catalog of registered actions, grounded on the teacher's
//! `WorkflowRegistry` (`HashMap<String, _>` of trait objects, register
//! rejects on name collision, `RegistryError` enum) — generalized from a
//! type-erased-factory registry to a type-erased-instance registry since
//! actions (unlike workflows) don't need per-call construction.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::action::{Action, ActionCategory, ActionContext, ActionError, ActionOutcome};
use soar_contracts::value::Value;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("action already registered: {0}")]
    AlreadyRegistered(String),
    #[error("action not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("parameter validation failed: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Read-mostly catalog of named actions (spec §4.5). Registration and the
/// dry-run swap are the only writers; `execute` only ever reads, so the
/// underlying `DashMap` needs no external locking for the read-heavy path
/// the executor drives it with.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<dyn Action>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, action: Arc<dyn Action>) -> Result<(), RegistryError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.actions.insert(name, action);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.remove(name).map(|(_, action)| action)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<dyn Action>> {
        self.actions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn by_category(&self, category: ActionCategory) -> Vec<Arc<dyn Action>> {
        self.actions
            .iter()
            .filter(|entry| entry.value().category() == category)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Permission check, then schema validation, then dispatch (spec §4.5
    /// "Operations").
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        context: &ActionContext,
    ) -> Result<ActionOutcome, RegistryError> {
        let action = self.get(name).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        action
            .check_permission(context)
            .map_err(RegistryError::PermissionDenied)?;
        action
            .validate_params(&params)
            .map_err(RegistryError::InvalidParams)?;
        Ok(action.execute(params, context).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::log_message::LogMessageAction;

    fn ctx() -> ActionContext {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        ActionContext {
            playbook_id: 1,
            execution_id: 1,
            organization_id: 1,
            user_id: None,
            variables: Value::object(),
            cancelled: rx,
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = ActionRegistry::new();
        registry.register(Arc::new(LogMessageAction)).unwrap();
        let err = registry.register(Arc::new(LogMessageAction)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn execute_unknown_action_is_not_found() {
        let registry = ActionRegistry::new();
        let result = registry.execute("nope", Value::object(), &ctx()).await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn by_category_filters() {
        let registry = ActionRegistry::new();
        registry.register(Arc::new(LogMessageAction)).unwrap();
        let notifications = registry.by_category(ActionCategory::Notification);
        assert_eq!(notifications.len(), 1);
        assert!(registry.by_category(ActionCategory::Cloud).is_empty());
    }
}
