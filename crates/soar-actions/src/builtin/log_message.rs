use async_trait::async_trait;
use soar_contracts::value::Value;

use crate::action::{Action, ActionCategory, ActionContext, ActionError, ActionOutcome, LogLevel};

/// `log_message(message)` — the simplest built-in (spec §4.5).
pub struct LogMessageAction;

#[async_trait]
impl Action for LogMessageAction {
    fn name(&self) -> &str {
        "log_message"
    }

    fn description(&self) -> &str {
        "Write a message to the execution log"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Notification
    }

    fn validate_params(&self, params: &Value) -> Result<(), String> {
        match params.get_path("message").and_then(Value::as_str) {
            Some(_) => Ok(()),
            None => Err("`message` is required and must be a string".to_string()),
        }
    }

    async fn execute(&self, params: Value, context: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let message = params.get_path("message").and_then(Value::as_str).unwrap_or_default();
        context.log(LogLevel::Info, message);
        Ok(ActionOutcome::ok_with_message(message))
    }
}
