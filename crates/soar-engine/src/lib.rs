//! # SOAR execution core
//!
//! The four subsystems that turn a security event into a completed playbook
//! run: the event bus and durable stream ingest, the trigger engine that
//! matches events to playbook bindings, the job queue and worker pool that
//! schedule and retry playbook runs, and the playbook executor that
//! interprets a playbook's step tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StreamPublisher / EventBus                │
//! │  (ingest: append to the durable stream, fan out in-process)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TriggerEngine                           │
//! │  (consumer group over the durable stream, binding lookup,    │
//! │   predicate evaluation, job enqueue)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  JobQueue / WorkerPool                        │
//! │  (priority FIFO queue, bounded concurrency, whole-job retry) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PlaybookExecutor                          │
//! │  (sequential step-loop interpreter, checkpoints, live         │
//! │   progress, action dispatch)                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod executor;
pub mod queue;
pub mod reliability;
pub mod trigger;
pub mod worker;

pub mod prelude {
    pub use crate::bus::{ExecutionLiveEmitter, EventBus, LiveChannel, LiveEnvelope, LiveEvent, LogLevel, StreamPublisher};
    pub use crate::executor::{ExecutorConfig, PlaybookExecutor};
    pub use crate::queue::{
        ExecutorError, ExecutorOutcome, JobOutcome, JobQueue, JobRecord, JobRunner, PlaybookJob,
        WorkerPool, WorkerPoolConfig,
    };
    pub use crate::reliability::{CircuitBreakerConfig, CircuitState, RetryPolicy};
    pub use crate::trigger::{TriggerEngine, TriggerEngineConfig, TriggerError};
    pub use crate::worker::{BackpressureConfig, BackpressureState};
}
