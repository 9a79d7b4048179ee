//! Dry-run action registry (spec §4.4 "Test mode"): built-ins run for real
//! since they have no external effect, but any other action name returns a
//! deterministic canned outcome instead of contacting a real collaborator.

use soar_contracts::value::Value;

use crate::action::{ActionContext, ActionOutcome};
use crate::builtin::register_builtins;
use crate::registry::{ActionRegistry, RegistryError};

#[derive(Clone)]
pub struct MockActionRegistry {
    inner: ActionRegistry,
}

impl MockActionRegistry {
    pub fn new() -> Self {
        let inner = ActionRegistry::new();
        register_builtins(&inner).expect("builtins register exactly once");
        Self { inner }
    }

    /// Dispatch to the real built-in if one is registered under `name`;
    /// otherwise synthesize a deterministic success outcome so playbooks
    /// exercised in dry-run see the same step shape a real run would.
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        context: &ActionContext,
    ) -> Result<ActionOutcome, RegistryError> {
        if self.inner.get(name).is_some() {
            return self.inner.execute(name, params, context).await;
        }

        let mut data = Value::object();
        data.set_path("mock", Value::from(true));
        data.set_path("actionName", Value::from(name));
        Ok(ActionOutcome::ok(data))
    }
}

impl Default for MockActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
