use async_trait::async_trait;
use soar_contracts::value::Value;
use soar_core::predicate;

use crate::action::{Action, ActionCategory, ActionContext, ActionError, ActionOutcome};

/// `conditional(condition, then, else)` — evaluates `condition` against the
/// execution's variables and returns whichever of `then`/`else` matched as
/// `data.branch`/`data.result` (spec §4.5). Distinct from a step's own
/// `if`/`condition`, which skips the step entirely rather than branching.
pub struct ConditionalAction;

#[async_trait]
impl Action for ConditionalAction {
    fn name(&self) -> &str {
        "conditional"
    }

    fn description(&self) -> &str {
        "Evaluate a predicate and report which branch it selects"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Remediation
    }

    fn validate_params(&self, params: &Value) -> Result<(), String> {
        match params.get_path("condition").and_then(Value::as_str) {
            Some(_) => Ok(()),
            None => Err("`condition` is required and must be a string".to_string()),
        }
    }

    async fn execute(&self, params: Value, context: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let condition = params.get_path("condition").and_then(Value::as_str).unwrap_or_default();
        let matched = predicate::evaluate(condition, &context.variables);

        let branch_key = if matched { "then" } else { "else" };
        let result = params.get_path(branch_key).cloned().unwrap_or(Value::Null);

        let mut data = Value::object();
        data.set_path("branch", Value::from(branch_key));
        data.set_path("result", result);
        Ok(ActionOutcome::ok(data))
    }
}
