//! Event fan-out: the in-process security event bus feeding the durable
//! stream, and the live progress channel the executor streams step
//! transitions through (spec §4.1, §4.6).

mod event_bus;
mod live;

pub use event_bus::{EventBus, StreamPublisher};
pub use live::{ExecutionLiveEmitter, LiveChannel, LiveEnvelope, LiveEvent, LogLevel};
