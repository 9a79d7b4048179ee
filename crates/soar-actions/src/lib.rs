//! The action layer: a pluggable execution unit (`Action`), a catalog of
//! registered instances (`ActionRegistry`), a dry-run variant used by test
//! executions, and the three built-ins the core ships.

pub mod action;
pub mod builtin;
pub mod mock;
pub mod registry;

pub mod prelude {
    pub use crate::action::{
        Action, ActionCategory, ActionContext, ActionError, ActionOutcome, LogLevel,
    };
    pub use crate::builtin::register_builtins;
    pub use crate::mock::MockActionRegistry;
    pub use crate::registry::{ActionRegistry, RegistryError};
}
