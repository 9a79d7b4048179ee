//! Worker pool that drives the job queue against the playbook executor
//! (spec §4.3). Concurrency, retry/backoff and the completed/failed record
//! rings are generalized from the teacher's `worker::pool`/`reliability::retry`
//! idiom; the claim/heartbeat/lease machinery that pattern also had is
//! dropped since this queue is in-process, not a distributed task lease.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::reliability::RetryPolicy;
use crate::worker::{BackpressureConfig, BackpressureState};

use super::job::PlaybookJob;
use super::priority_queue::JobQueue;

pub const COMPLETED_RECORD_RETENTION: usize = 100;
pub const FAILED_RECORD_RETENTION: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: u64,
    pub playbook_id: i64,
    pub execution_id: Option<i64>,
    pub outcome: JobOutcome,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Result of one executor invocation (spec §4.4 completion/failure shapes).
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    pub execution_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("playbook validation failed: {0}")]
    Validation(String),
    #[error("execution {execution_id} aborted: {reason}")]
    Aborted { execution_id: i64, reason: String },
    #[error("execution {execution_id} cancelled")]
    Cancelled { execution_id: i64 },
}

impl ExecutorError {
    /// Whole-job failures (spec §4.3 "failed at the queue level") are
    /// retried; validation and cancellation are not (spec §7).
    fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::Aborted { .. })
    }
}

/// Contract the queue drives; implemented by `soar-engine::executor::PlaybookExecutor`.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        job: PlaybookJob,
        cancelled: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError>;
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub job_attempts: u32,
    pub backoff_initial: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { concurrency: 5, job_attempts: 3, backoff_initial: Duration::from_secs(2) }
    }
}

/// Pulls jobs from `queue` and runs them against `runner`, retrying
/// queue-level failures with exponential backoff (spec §4.3 "Retry &
/// backoff"). Cancellation is cooperative: `request_cancel` flips a
/// per-job watch channel the executor polls between steps.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    runner: Arc<dyn JobRunner>,
    backpressure: Arc<BackpressureState>,
    config: WorkerPoolConfig,
    completed: Mutex<VecDeque<JobRecord>>,
    failed: Mutex<VecDeque<JobRecord>>,
    cancellations: DashMap<u64, watch::Sender<bool>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, runner: Arc<dyn JobRunner>, config: WorkerPoolConfig) -> Self {
        let backpressure = Arc::new(BackpressureState::new(BackpressureConfig::default(), config.concurrency));
        Self {
            queue,
            runner,
            backpressure,
            config,
            completed: Mutex::new(VecDeque::new()),
            failed: Mutex::new(VecDeque::new()),
            cancellations: DashMap::new(),
        }
    }

    /// Spawn `concurrency` worker loops; each runs until `shutdown` fires.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.concurrency)
            .map(|worker_idx| {
                let pool = Arc::clone(self);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() { break; }
                            }
                            job = pool.queue.dequeue() => {
                                pool.run_job_with_retries(job, worker_idx).await;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Request cooperative cancellation of a running job; a no-op if the
    /// job isn't currently running (already finished, or never started).
    pub fn request_cancel(&self, job_id: u64) {
        if let Some(sender) = self.cancellations.get(&job_id) {
            let _ = sender.send(true);
        }
    }

    pub fn completed_records(&self) -> Vec<JobRecord> {
        self.completed.lock().iter().cloned().collect()
    }

    pub fn failed_records(&self) -> Vec<JobRecord> {
        self.failed.lock().iter().cloned().collect()
    }

    #[instrument(skip(self, job), fields(job_id = job.id, playbook_id = job.playbook_id, worker_idx))]
    async fn run_job_with_retries(&self, job: PlaybookJob, worker_idx: usize) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancellations.insert(job.id, cancel_tx);

        let retry_policy = RetryPolicy::exponential()
            .with_max_attempts(self.config.job_attempts)
            .with_initial_interval(self.config.backoff_initial)
            .with_jitter(0.0);

        let mut attempt = 1;
        let result = loop {
            self.backpressure.task_started();
            let outcome = self.runner.run(job.clone(), cancel_rx.clone()).await;
            self.backpressure.task_completed();

            match outcome {
                Ok(outcome) => break Ok((outcome, attempt)),
                Err(err) if err.is_retryable() && retry_policy.has_attempts_remaining(attempt) => {
                    let delay = retry_policy.delay_for_attempt(attempt + 1);
                    warn!(%err, attempt, delay_ms = delay.as_millis() as u64, "retrying job after queue-level failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => break Err((err, attempt)),
            }
        };

        self.cancellations.remove(&job.id);

        match result {
            Ok((outcome, attempts)) => {
                info!(execution_id = outcome.execution_id, attempts, "job completed");
                soar_core::metrics::record_job_outcome("completed");
                self.push_bounded(
                    &self.completed,
                    JobRecord {
                        job_id: job.id,
                        playbook_id: job.playbook_id,
                        execution_id: Some(outcome.execution_id),
                        outcome: JobOutcome::Completed,
                        attempts,
                        error: None,
                    },
                    COMPLETED_RECORD_RETENTION,
                );
            }
            Err((err, attempts)) => {
                let execution_id = match &err {
                    ExecutorError::Aborted { execution_id, .. } | ExecutorError::Cancelled { execution_id } => {
                        Some(*execution_id)
                    }
                    ExecutorError::Validation(_) => None,
                };
                warn!(%err, attempts, "job failed at the queue level");
                soar_core::metrics::record_job_outcome("failed");
                self.push_bounded(
                    &self.failed,
                    JobRecord {
                        job_id: job.id,
                        playbook_id: job.playbook_id,
                        execution_id,
                        outcome: JobOutcome::Failed,
                        attempts,
                        error: Some(err.to_string()),
                    },
                    FAILED_RECORD_RETENTION,
                );
            }
        }
    }

    fn push_bounded(&self, ring: &Mutex<VecDeque<JobRecord>>, record: JobRecord, retention: usize) {
        let mut ring = ring.lock();
        ring.push_back(record);
        while ring.len() > retention {
            ring.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soar_contracts::event::{EntityType, Event};
    use soar_contracts::value::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn event() -> Event {
        Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object())
    }

    struct FlakyRunner {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl JobRunner for FlakyRunner {
        async fn run(&self, job: PlaybookJob, _cancelled: watch::Receiver<bool>) -> Result<ExecutorOutcome, ExecutorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(ExecutorOutcome { execution_id: job.playbook_id })
            } else {
                Err(ExecutorError::Aborted { execution_id: 1, reason: "transient".into() })
            }
        }
    }

    struct AlwaysFailRunner;

    #[async_trait]
    impl JobRunner for AlwaysFailRunner {
        async fn run(&self, _job: PlaybookJob, _cancelled: watch::Receiver<bool>) -> Result<ExecutorOutcome, ExecutorError> {
            Err(ExecutorError::Validation("bad playbook".into()))
        }
    }

    #[tokio::test]
    async fn retries_aborted_jobs_up_to_configured_attempts() {
        let queue = Arc::new(JobQueue::new());
        let runner = Arc::new(FlakyRunner { calls: AtomicU32::new(0), succeed_on: 2 });
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            runner,
            WorkerPoolConfig { concurrency: 1, job_attempts: 3, backoff_initial: Duration::from_millis(1) },
        ));

        queue.enqueue(PlaybookJob::new(7, event(), 1));
        let job = queue.dequeue().await;
        pool.run_job_with_retries(job, 0).await;

        assert_eq!(pool.completed_records().len(), 1);
        assert_eq!(pool.completed_records()[0].attempts, 2);
        assert!(pool.failed_records().is_empty());
    }

    #[tokio::test]
    async fn validation_failures_are_not_retried() {
        let queue = Arc::new(JobQueue::new());
        let runner = Arc::new(AlwaysFailRunner);
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            runner,
            WorkerPoolConfig { concurrency: 1, job_attempts: 3, backoff_initial: Duration::from_millis(1) },
        ));

        queue.enqueue(PlaybookJob::new(7, event(), 1));
        let job = queue.dequeue().await;
        pool.run_job_with_retries(job, 0).await;

        assert_eq!(pool.failed_records().len(), 1);
        assert_eq!(pool.failed_records()[0].attempts, 1);
    }
}
