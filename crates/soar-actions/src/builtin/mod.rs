//! The three built-in actions the core ships (spec §4.5): everything else
//! is an external collaborator registered at startup.

pub mod conditional;
pub mod delay;
pub mod log_message;

use std::sync::Arc;

use crate::registry::{ActionRegistry, RegistryError};

/// Register all built-ins into `registry`. Called once at bootstrap.
pub fn register_builtins(registry: &ActionRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(log_message::LogMessageAction))?;
    registry.register(Arc::new(delay::DelayAction))?;
    registry.register(Arc::new(conditional::ConditionalAction))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_exactly_the_three_builtins() {
        let registry = ActionRegistry::new();
        register_builtins(&registry).unwrap();
        let mut names: Vec<&'static str> =
            registry.all().iter().map(|a| match a.name() {
                "log_message" => "log_message",
                "delay" => "delay",
                "conditional" => "conditional",
                other => panic!("unexpected builtin {other}"),
            }).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["conditional", "delay", "log_message"]);
    }
}
