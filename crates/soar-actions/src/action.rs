//! The `Action` trait every step dispatches against (spec §4.5).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soar_contracts::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Notification,
    Remediation,
    Investigation,
    Cloud,
    Agent,
}

/// Per-invocation context passed to `execute` (spec §4.5 "`context` exposes").
pub struct ActionContext {
    pub playbook_id: i64,
    pub execution_id: i64,
    pub organization_id: i64,
    pub user_id: Option<i64>,
    pub variables: Value,
    /// Cooperative cancellation signal — actions that run in a loop should
    /// poll `*cancelled.borrow()` and exit early when true (spec §4.3
    /// "In-flight step execution cannot be preempted", so this is advisory,
    /// not enforced by the runtime).
    pub cancelled: tokio::sync::watch::Receiver<bool>,
}

impl ActionContext {
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(execution_id = self.execution_id, "{message}"),
            LogLevel::Warning => tracing::warn!(execution_id = self.execution_id, "{message}"),
            LogLevel::Error => tracing::error!(execution_id = self.execution_id, "{message}"),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// The `{ success, data?, message?, error? }` shape every action returns
/// (spec §4.4 step 6, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), message: None, error: None }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self { success: true, data: None, message: Some(message.into()), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, message: None, error: Some(error.into()) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("action panicked or returned an internal error: {0}")]
    Internal(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A named, pluggable unit of work a playbook step can invoke.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> ActionCategory;

    /// Validate `params` against this action's parameter schema before
    /// dispatch (spec §4.4 step 5). The default accepts anything — actions
    /// with required parameters should override this.
    fn validate_params(&self, _params: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Optional permission predicate (spec §4.4 step 4). Returning `Err`
    /// denies the call with the given reason.
    fn check_permission(&self, _context: &ActionContext) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, params: Value, context: &ActionContext) -> Result<ActionOutcome, ActionError>;
}
