//! Job queue and worker pool (spec §4.3): a priority FIFO queue feeding a
//! bounded pool of workers that drive playbook executions with whole-job
//! retry and backoff.

mod job;
mod pool;
mod priority_queue;

pub use job::PlaybookJob;
pub use pool::{
    ExecutorError, ExecutorOutcome, JobOutcome, JobRecord, JobRunner, WorkerPool, WorkerPoolConfig,
    COMPLETED_RECORD_RETENTION, FAILED_RECORD_RETENTION,
};
pub use priority_queue::JobQueue;
