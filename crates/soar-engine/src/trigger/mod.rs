//! Trigger engine (spec §4.2): matches durable-stream events against
//! active bindings and enqueues playbook jobs.

mod engine;

pub use engine::{TriggerEngine, TriggerEngineConfig, TriggerError, CONSUMER_GROUP};
