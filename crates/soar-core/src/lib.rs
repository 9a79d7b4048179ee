//! Predicate evaluation, template rendering, configuration and telemetry
//! init shared by the trigger engine, playbook executor and server binary.

pub mod config;
pub mod metrics;
pub mod predicate;
pub mod telemetry;
pub mod template;

pub mod prelude {
    pub use crate::config::{Config, ConfigError};
    pub use crate::predicate::{evaluate, matches_filter, parse, Expr, PredicateError};
    pub use crate::telemetry::{init_telemetry, TelemetryConfig};
    pub use crate::template::{render, render_value};
}
