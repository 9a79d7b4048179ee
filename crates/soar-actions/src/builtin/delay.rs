use std::time::Duration;

use async_trait::async_trait;
use soar_contracts::value::Value;

use crate::action::{Action, ActionCategory, ActionContext, ActionError, ActionOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `delay(milliseconds)` — sleeps, polling cooperative cancellation between
/// chunks so a cancelled job doesn't block its full duration (spec §4.3
/// "the worker signals cancellation between steps").
pub struct DelayAction;

#[async_trait]
impl Action for DelayAction {
    fn name(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Pause step execution for a fixed duration"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Remediation
    }

    fn validate_params(&self, params: &Value) -> Result<(), String> {
        match params.get_path("milliseconds").and_then(Value::as_f64) {
            Some(ms) if ms >= 0.0 => Ok(()),
            Some(_) => Err("`milliseconds` must be non-negative".to_string()),
            None => Err("`milliseconds` is required and must be a number".to_string()),
        }
    }

    async fn execute(&self, params: Value, context: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let total_ms = params.get_path("milliseconds").and_then(Value::as_f64).unwrap_or(0.0);
        let mut remaining = Duration::from_millis(total_ms as u64);
        let mut cancelled = context.cancelled.clone();

        while !remaining.is_zero() {
            let chunk = remaining.min(POLL_INTERVAL);
            tokio::select! {
                _ = tokio::time::sleep(chunk) => {}
                _ = cancelled.changed() => {
                    if *cancelled.borrow() {
                        return Ok(ActionOutcome::failure("cancelled during delay"));
                    }
                }
            }
            remaining -= chunk;
        }

        Ok(ActionOutcome::ok_with_message("delay complete"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn sleeps_for_requested_duration() {
        let action = DelayAction;
        let params: Value = serde_json::json!({"milliseconds": 10}).into();
        let start = tokio::time::Instant::now();
        let outcome = action.execute(params, &ctx()).await.unwrap();
        assert!(outcome.success);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn cancellation_ends_the_delay_early() {
        let action = DelayAction;
        let (tx, rx) = tokio::sync::watch::channel(false);
        let context = ActionContext {
            playbook_id: 1,
            execution_id: 1,
            organization_id: 1,
            user_id: None,
            variables: Value::object(),
            cancelled: rx,
        };
        let params: Value = serde_json::json!({"milliseconds": 5000}).into();

        let handle = tokio::spawn(async move { action.execute(params, &context).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn rejects_negative_duration() {
        let action = DelayAction;
        let params: Value = serde_json::json!({"milliseconds": -1}).into();
        assert!(action.validate_params(&params).is_err());
    }
}
