//! Playbook executor (spec §4.4): a single-threaded step-loop interpreter,
//! not an event-sourced replay engine. Each job runs its steps in order,
//! checkpointing before every step so `onError: rollback` has somewhere to
//! restore to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use soar_actions::action::{ActionContext, ActionOutcome};
use soar_actions::mock::MockActionRegistry;
use soar_actions::registry::{ActionRegistry, RegistryError};
use soar_contracts::audit::{AuditEntityType, AuditLogEntry, AuditSeverity, AuditSource};
use soar_contracts::execution::{ExecutionState, ExecutionStatus, LogLevel as StateLogLevel, PlaybookExecution, StepRecord, StepStatus};
use soar_contracts::playbook::{OnError, Playbook, Step};
use soar_contracts::value::Value;
use soar_core::{predicate, template};
use soar_storage::store::{ExecutionStatusUpdate, RelationalStore, StoreError};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::bus::{ExecutionLiveEmitter, LiveChannel, LiveEvent, LogLevel};
use crate::queue::{ExecutorError, ExecutorOutcome, JobRunner, PlaybookJob};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub checkpoint_retention: usize,
    pub step_backoff_initial: Duration,
    pub step_backoff_max: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            checkpoint_retention: ExecutionState::CHECKPOINT_RETENTION_DEFAULT,
            step_backoff_initial: Duration::from_millis(1000),
            step_backoff_max: Duration::from_millis(10_000),
        }
    }
}

/// Runs playbooks against a real or mock action catalog, persisting
/// progress through `store` and streaming it over `live`.
pub struct PlaybookExecutor {
    store: Arc<dyn RelationalStore>,
    actions: Arc<ActionRegistry>,
    mock_actions: Arc<MockActionRegistry>,
    live: LiveChannel,
    config: ExecutorConfig,
}

/// Internal verdict for one step, driving which branch (if any) to recurse
/// into and whether the step loop keeps going.
enum StepOutcome {
    Completed,
    /// Failed but recovered via `onError: continue`; the caller recurses
    /// into the step's `else` branch, then keeps walking siblings.
    Recovered,
    Skipped,
    /// Stops the whole step loop; `reason` becomes the execution's error
    /// and `aborted` distinguishes a forced/onError=abort stop (terminal
    /// status `Aborted`) from a retry-exhausted `onError: abort` (`Failed`).
    Stopped { reason: String, aborted: bool },
}

impl PlaybookExecutor {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        actions: Arc<ActionRegistry>,
        mock_actions: Arc<MockActionRegistry>,
        live: LiveChannel,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, actions, mock_actions, live, config }
    }

    #[instrument(skip(self, job, cancelled), fields(playbook_id = job.playbook_id, dry_run = job.dry_run))]
    async fn execute(
        &self,
        job: PlaybookJob,
        cancelled: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        let playbook = self
            .store
            .get_playbook(job.playbook_id)
            .await
            .map_err(|err| ExecutorError::Validation(err.to_string()))?
            .ok_or_else(|| ExecutorError::Validation(format!("playbook {} not found", job.playbook_id)))?;

        if playbook.organization_id != job.organization_id {
            return Err(ExecutorError::Validation(format!(
                "playbook {} belongs to organization {}, job is for {}",
                playbook.id, playbook.organization_id, job.organization_id
            )));
        }
        if !playbook.is_active {
            return Err(ExecutorError::Validation(format!("playbook {} is not active", playbook.id)));
        }

        let mut variables = job.context.clone();
        variables.merge_object(&job.trigger_event.data);
        let mut state = ExecutionState::new(variables);

        let execution_id = self
            .store
            .insert_execution(PlaybookExecution {
                id: 0,
                playbook_id: playbook.id,
                organization_id: playbook.organization_id,
                user_id: job.user_id,
                trigger_data: job.trigger_event.data.clone(),
                status: ExecutionStatus::Running,
                started_at: job.trigger_event.timestamp,
                completed_at: None,
                duration_ms: None,
                results: Value::object(),
                error: None,
            })
            .await
            .map_err(|err| ExecutorError::Validation(err.to_string()))?;

        let emitter = Arc::new(ExecutionLiveEmitter::new(
            self.live.clone(),
            execution_id,
            playbook.organization_id,
            playbook.id,
        ));
        emitter.emit(LiveEvent::ExecutionStarted);
        self.audit(
            execution_id,
            playbook.organization_id,
            job.user_id,
            "playbook.started",
            AuditSeverity::Info,
            job.dry_run,
        )
        .await;

        let start = std::time::Instant::now();
        let outcome = self
            .run_steps(&playbook.definition.steps, &mut state, &job, execution_id, &cancelled, &emitter)
            .await;

        let (status, error) = match &outcome {
            Ok(StepOutcome::Completed) | Ok(StepOutcome::Recovered) | Ok(StepOutcome::Skipped) => {
                (ExecutionStatus::Completed, None)
            }
            Ok(StepOutcome::Stopped { reason, aborted: true }) => (ExecutionStatus::Aborted, Some(reason.clone())),
            Ok(StepOutcome::Stopped { reason, aborted: false }) => (ExecutionStatus::Failed, Some(reason.clone())),
            Err(_) => (ExecutionStatus::Failed, Some("internal executor error".to_string())),
        };
        let status = if *cancelled.borrow() { ExecutionStatus::Cancelled } else { status };

        let results = serde_json::to_value(&state).unwrap_or_default().into();
        self.store
            .update_execution_status(
                execution_id,
                status,
                ExecutionStatusUpdate {
                    completed_at: Some(chrono::Utc::now()),
                    duration_ms: Some(start.elapsed().as_millis() as i64),
                    results: Some(results),
                    error: error.clone(),
                },
            )
            .await
            .map_err(|err| ExecutorError::Aborted { execution_id, reason: err.to_string() })?;

        emitter.emit(LiveEvent::ExecutionCompleted { status: format!("{status:?}") });
        info!(execution_id, ?status, "execution finished");

        let (action, severity) = match status {
            ExecutionStatus::Completed => ("playbook.completed", AuditSeverity::Info),
            ExecutionStatus::Failed => ("playbook.failed", AuditSeverity::Error),
            ExecutionStatus::Aborted => ("playbook.aborted", AuditSeverity::Critical),
            ExecutionStatus::Cancelled => ("playbook.cancelled", AuditSeverity::Warning),
            ExecutionStatus::Running => ("playbook.running", AuditSeverity::Info),
        };
        self.audit(execution_id, playbook.organization_id, job.user_id, action, severity, job.dry_run)
            .await;

        if status == ExecutionStatus::Cancelled {
            return Err(ExecutorError::Cancelled { execution_id });
        }
        outcome.map_err(|err: StoreError| ExecutorError::Aborted { execution_id, reason: err.to_string() })?;
        Ok(ExecutorOutcome { execution_id })
    }

    /// Walks `steps` in order; each step's branch (`then` on success,
    /// `else` after an `onError: continue` recovery) runs depth-first
    /// before moving to the next sibling (spec §4.4 branching).
    fn run_steps<'a>(
        &'a self,
        steps: &'a [Step],
        state: &'a mut ExecutionState,
        job: &'a PlaybookJob,
        execution_id: i64,
        cancelled: &'a watch::Receiver<bool>,
        emitter: &'a ExecutionLiveEmitter,
    ) -> BoxFuture<'a, Result<StepOutcome, StoreError>> {
        Box::pin(async move {
            for step in steps {
                if *cancelled.borrow() {
                    return Ok(StepOutcome::Stopped { reason: "cancelled".into(), aborted: false });
                }

                match self.run_step(step, state, job, execution_id, cancelled, emitter).await? {
                    StepOutcome::Skipped => continue,
                    StepOutcome::Completed => {
                        if !step.then.is_empty() {
                            match self.run_steps(&step.then, state, job, execution_id, cancelled, emitter).await? {
                                StepOutcome::Stopped { reason, aborted } => {
                                    return Ok(StepOutcome::Stopped { reason, aborted })
                                }
                                _ => continue,
                            }
                        }
                    }
                    StepOutcome::Recovered => {
                        if !step.on_false.is_empty() {
                            match self.run_steps(&step.on_false, state, job, execution_id, cancelled, emitter).await? {
                                StepOutcome::Stopped { reason, aborted } => {
                                    return Ok(StepOutcome::Stopped { reason, aborted })
                                }
                                _ => continue,
                            }
                        }
                    }
                    stopped @ StepOutcome::Stopped { .. } => return Ok(stopped),
                }
            }
            Ok(StepOutcome::Completed)
        })
    }

    async fn run_step(
        &self,
        step: &Step,
        state: &mut ExecutionState,
        job: &PlaybookJob,
        execution_id: i64,
        cancelled: &watch::Receiver<bool>,
        emitter: &ExecutionLiveEmitter,
    ) -> Result<StepOutcome, StoreError> {
        if let Some(condition) = &step.condition {
            if !predicate::evaluate(condition, &state.variables) {
                state.steps.insert(step.id.clone(), {
                    let mut record = StepRecord::pending();
                    record.status = StepStatus::Skipped;
                    record
                });
                emitter.emit(LiveEvent::StepStatusChanged { step_id: step.id.clone(), status: StepStatus::Skipped });
                return Ok(StepOutcome::Skipped);
            }
        }

        state.current_step_id = Some(step.id.clone());
        state.push_checkpoint(&step.id, self.config.checkpoint_retention);
        let mut record = StepRecord::pending();
        record.status = StepStatus::Running;
        record.start_time = Some(chrono::Utc::now());
        state.steps.insert(step.id.clone(), record);
        emitter.emit(LiveEvent::StepStarted { step_id: step.id.clone() });
        let _timer = soar_core::metrics::step_timer();

        let max_attempts = step.retries + 1;
        let mut attempt = 1u32;
        let mut allow_onerror_retry = matches!(step.on_error, OnError::Retry);

        loop {
            if *cancelled.borrow() {
                self.finish_step(state, step, StepStatus::Failed, None, Some("cancelled".into()), emitter);
                return Ok(StepOutcome::Stopped { reason: "cancelled".into(), aborted: false });
            }

            let rendered_params = template::render_value(&step.params, &state.variables);
            let context = ActionContext {
                playbook_id: job.playbook_id,
                execution_id,
                organization_id: job.organization_id,
                user_id: job.user_id,
                variables: state.variables.deep_clone(),
                cancelled: cancelled.clone(),
            };

            let dispatch = self.dispatch(step, rendered_params, &context, job.dry_run);
            let dispatch = tokio::time::timeout(Duration::from_millis(step.timeout_ms), dispatch).await;

            let outcome = match dispatch {
                Err(_elapsed) => {
                    let message = format!("step {} timed out after {}ms", step.id, step.timeout_ms);
                    self.state_log(state, StateLogLevel::Error, &message, &step.id);
                    Err(BusinessFailure(message))
                }
                Ok(Err(RegistryError::PermissionDenied(reason))) => {
                    self.finish_step(state, step, StepStatus::Failed, None, Some(reason.clone()), emitter);
                    return Ok(StepOutcome::Stopped {
                        reason: format!("step {} permission denied: {reason}", step.id),
                        aborted: true,
                    });
                }
                Ok(Err(RegistryError::NotFound(name))) => {
                    let reason = format!("action {name} not found");
                    self.finish_step(state, step, StepStatus::Failed, None, Some(reason.clone()), emitter);
                    return Ok(StepOutcome::Stopped {
                        reason: format!("step {}: {reason}", step.id),
                        aborted: true,
                    });
                }
                Ok(Err(RegistryError::InvalidParams(reason))) => {
                    self.finish_step(state, step, StepStatus::Failed, None, Some(reason.clone()), emitter);
                    return Ok(StepOutcome::Stopped {
                        reason: format!("step {}: invalid params: {reason}", step.id),
                        aborted: true,
                    });
                }
                Ok(Err(RegistryError::AlreadyRegistered(_))) => unreachable!("not produced by execute"),
                Ok(Err(RegistryError::Action(action_err))) => Err(BusinessFailure(action_err.to_string())),
                Ok(Ok(outcome)) if !outcome.success => {
                    Err(BusinessFailure(outcome.error.unwrap_or_else(|| "action reported failure".into())))
                }
                Ok(Ok(outcome)) => Ok(outcome),
            };

            match outcome {
                Ok(outcome) => {
                    if let Some(data) = &outcome.data {
                        state.variables.merge_object(data);
                    }
                    self.finish_step(state, step, StepStatus::Completed, outcome.data.clone(), None, emitter);
                    return Ok(StepOutcome::Completed);
                }
                Err(BusinessFailure(message)) => {
                    if attempt < max_attempts {
                        let delay = self.backoff(attempt);
                        warn!(step_id = %step.id, attempt, delay_ms = delay.as_millis() as u64, "retrying step after failure");
                        state.steps.entry(step.id.clone()).and_modify(|r| {
                            r.status = StepStatus::Retrying;
                            r.attempts = attempt;
                        });
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    // Retries exhausted. `onError: retry` gets one further
                    // escalation: roll back to the pre-step checkpoint and
                    // re-run the whole attempt budget once before falling
                    // through to an abort, so a flapping dependency doesn't
                    // retry the step forever.
                    if matches!(step.on_error, OnError::Retry) && allow_onerror_retry {
                        allow_onerror_retry = false;
                        state.rollback_to_latest_checkpoint();
                        state.steps.entry(step.id.clone()).and_modify(|r| r.status = StepStatus::Retrying);
                        attempt = 1;
                        continue;
                    }

                    return Ok(self.apply_on_error(step, state, message, emitter));
                }
            }
        }
    }

    fn apply_on_error(
        &self,
        step: &Step,
        state: &mut ExecutionState,
        message: String,
        emitter: &ExecutionLiveEmitter,
    ) -> StepOutcome {
        match step.on_error {
            OnError::Continue => {
                self.finish_step(state, step, StepStatus::Failed, None, Some(message), emitter);
                StepOutcome::Recovered
            }
            OnError::Rollback => {
                state.rollback_to_latest_checkpoint();
                self.finish_step(state, step, StepStatus::Failed, None, Some(message.clone()), emitter);
                StepOutcome::Stopped { reason: format!("step {}: {message}", step.id), aborted: false }
            }
            OnError::Abort | OnError::Retry => {
                self.finish_step(state, step, StepStatus::Failed, None, Some(message.clone()), emitter);
                StepOutcome::Stopped { reason: format!("step {}: {message}", step.id), aborted: false }
            }
        }
    }

    fn finish_step(
        &self,
        state: &mut ExecutionState,
        step: &Step,
        status: StepStatus,
        output: Option<Value>,
        error: Option<String>,
        emitter: &ExecutionLiveEmitter,
    ) {
        state.steps.entry(step.id.clone()).and_modify(|record| {
            record.status = status;
            record.end_time = Some(chrono::Utc::now());
            record.output = output.clone();
            record.error = error.clone();
        });
        soar_core::metrics::record_step_outcome(match status {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Retrying => "retrying",
            _ => "other",
        });
        if let Some(error) = &error {
            self.state_log(state, StateLogLevel::Error, error, &step.id);
            emitter.log(Some(step.id.clone()), StateLogLevel::Error.into(), error.clone());
        }
        emitter.emit(LiveEvent::StepStatusChanged { step_id: step.id.clone(), status });
    }

    fn state_log(&self, state: &mut ExecutionState, level: StateLogLevel, message: &str, step_id: &str) {
        state.log(level, message.to_string(), Some(step_id.to_string()));
    }

    /// Every terminal status is paired with a persisted audit entry (spec §3
    /// invariant). Dry-run executions are recorded under `entity_type: test`
    /// per §4.4 "Test mode" rather than under the ordinary execution trail.
    async fn audit(
        &self,
        execution_id: i64,
        organization_id: i64,
        user_id: Option<i64>,
        action: &str,
        severity: AuditSeverity,
        dry_run: bool,
    ) {
        let entity_type = if dry_run { AuditEntityType::Test } else { AuditEntityType::Execution };
        let mut entry = AuditLogEntry::new(entity_type, execution_id, action, organization_id, AuditSource::System)
            .with_severity(severity);
        if let Some(user_id) = user_id {
            entry = entry.with_user(user_id);
        }
        if let Err(err) = self.store.append_audit_log(entry).await {
            warn!(%err, execution_id, action, "failed to append audit log entry");
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let initial = self.config.step_backoff_initial.as_millis() as u64;
        let scaled = initial.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        Duration::from_millis(scaled.min(self.config.step_backoff_max.as_millis() as u64))
    }

    async fn dispatch(
        &self,
        step: &Step,
        params: Value,
        context: &ActionContext,
        dry_run: bool,
    ) -> Result<ActionOutcome, RegistryError> {
        if dry_run {
            self.mock_actions.execute(&step.action_id, params, context).await
        } else {
            self.actions.execute(&step.action_id, params, context).await
        }
    }
}

struct BusinessFailure(String);

#[async_trait]
impl JobRunner for PlaybookExecutor {
    async fn run(
        &self,
        job: PlaybookJob,
        cancelled: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        self.execute(job, cancelled).await
    }
}

// Map the live-channel log level onto the persisted execution-state log
// level; the two enums exist in different crates for different audiences
// (transient stream vs. durable record) but share the same three values.
impl From<StateLogLevel> for LogLevel {
    fn from(level: StateLogLevel) -> Self {
        match level {
            StateLogLevel::Info => LogLevel::Info,
            StateLogLevel::Warning => LogLevel::Warn,
            StateLogLevel::Error => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soar_actions::builtin::register_builtins;
    use soar_contracts::event::{EntityType, Event};
    use soar_contracts::playbook::PlaybookDefinition;
    use soar_contracts::prelude::AuditLogEntry;
    use soar_storage::memory::InMemoryRelationalStore;
    use soar_storage::store::RelationalStore as _;
    use std::sync::Arc;

    fn playbook(steps: Vec<Step>) -> Playbook {
        Playbook {
            id: 1,
            organization_id: 1,
            name: "test".into(),
            trigger_type: "alert.created".into(),
            is_active: true,
            definition: PlaybookDefinition {
                trigger: Default::default(),
                steps,
            },
        }
    }

    fn step(id: &str, action_id: &str, params: Value) -> Step {
        Step {
            id: id.into(),
            action_id: action_id.into(),
            params,
            condition: None,
            then: vec![],
            on_false: vec![],
            timeout_ms: 5000,
            retries: 0,
            on_error: OnError::Abort,
        }
    }

    fn store_with_playbook(pb: Playbook) -> Arc<InMemoryRelationalStore> {
        let store = Arc::new(InMemoryRelationalStore::default());
        store.seed_playbook(pb);
        store
    }

    fn job(playbook_id: i64) -> PlaybookJob {
        let event = Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object());
        PlaybookJob::new(playbook_id, event, 1)
    }

    #[tokio::test]
    async fn completes_a_single_successful_step() {
        let store = store_with_playbook(playbook(vec![step(
            "s1",
            "log_message",
            serde_json::json!({"message": "hi"}).into(),
        )]));

        let actions = Arc::new(ActionRegistry::new());
        register_builtins(&actions).unwrap();
        let mock = Arc::new(MockActionRegistry::new());
        let executor =
            PlaybookExecutor::new(store.clone(), actions, mock, LiveChannel::new(), ExecutorConfig::default());

        let (_tx, cancelled) = watch::channel(false);
        let outcome = executor.run(job(1), cancelled).await.unwrap();

        let execution = store.get_execution(outcome.execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_action_aborts_the_execution() {
        let store = store_with_playbook(playbook(vec![step("s1", "does_not_exist", Value::object())]));

        let actions = Arc::new(ActionRegistry::new());
        let mock = Arc::new(MockActionRegistry::new());
        let executor =
            PlaybookExecutor::new(store.clone(), actions, mock, LiveChannel::new(), ExecutorConfig::default());

        let (_tx, cancelled) = watch::channel(false);
        let outcome = executor.run(job(1), cancelled).await.unwrap();

        let execution = store.get_execution(outcome.execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Aborted);
        assert!(execution.error.is_some());
    }

    struct AlwaysFailsAction;

    #[async_trait]
    impl soar_actions::action::Action for AlwaysFailsAction {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn description(&self) -> &str {
            "test fixture: reports business failure"
        }
        fn category(&self) -> soar_actions::action::ActionCategory {
            soar_actions::action::ActionCategory::Remediation
        }
        async fn execute(
            &self,
            _params: Value,
            _context: &ActionContext,
        ) -> Result<ActionOutcome, soar_actions::action::ActionError> {
            Ok(ActionOutcome::failure("boom"))
        }
    }

    #[tokio::test]
    async fn on_error_continue_recovers_into_else_branch() {
        let recovery_step = step("recovery", "log_message", serde_json::json!({"message": "recovered"}).into());
        let mut failing = step("fails", "always_fails", Value::object());
        failing.on_error = OnError::Continue;
        failing.on_false = vec![recovery_step];

        let store = store_with_playbook(playbook(vec![failing]));
        let actions = Arc::new(ActionRegistry::new());
        register_builtins(&actions).unwrap();
        actions.register(Arc::new(AlwaysFailsAction)).unwrap();
        let mock = Arc::new(MockActionRegistry::new());
        let executor =
            PlaybookExecutor::new(store.clone(), actions, mock, LiveChannel::new(), ExecutorConfig::default());

        let (_tx, cancelled) = watch::channel(false);
        let outcome = executor.run(job(1), cancelled).await.unwrap();

        let execution = store.get_execution(outcome.execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[allow(dead_code)]
    fn unused(_: AuditLogEntry) {}
}
