//! Trigger engine (spec §4.2): consumes the durable event stream as a
//! dedicated consumer group, looks up active bindings for each event's
//! type, evaluates each binding's predicate in priority order, and enqueues
//! a job for every binding that matches.

use std::sync::Arc;
use std::time::Duration;

use soar_contracts::binding::PlaybookBinding;
use soar_contracts::event::Event;
use soar_contracts::value::Value;
use soar_core::predicate;
use soar_storage::stream::{DurableEventStream, StreamError, StreamMessage};
use soar_storage::store::{RelationalStore, StoreError};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::queue::{JobQueue, PlaybookJob};

pub const CONSUMER_GROUP: &str = "trigger-engine";

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct TriggerEngineConfig {
    pub consumer_id: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl Default for TriggerEngineConfig {
    fn default() -> Self {
        Self { consumer_id: "trigger-engine-0".into(), batch_size: 32, poll_interval: Duration::from_millis(200) }
    }
}

/// Drives bindings to jobs. Holds no event-bus subscription of its own: it
/// reads exclusively from the durable stream so redelivery on a crashed
/// consumer still reaches every binding (spec §4.1 at-least-once).
pub struct TriggerEngine {
    stream: Arc<dyn DurableEventStream>,
    store: Arc<dyn RelationalStore>,
    queue: Arc<JobQueue>,
    config: TriggerEngineConfig,
}

impl TriggerEngine {
    pub fn new(
        stream: Arc<dyn DurableEventStream>,
        store: Arc<dyn RelationalStore>,
        queue: Arc<JobQueue>,
        config: TriggerEngineConfig,
    ) -> Self {
        Self { stream, store, queue, config }
    }

    /// Runs the poll loop until `shutdown` resolves. Intended to be spawned
    /// as its own task by the server bootstrap.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = self.poll_once() => {}
            }
        }
    }

    /// One consume-process-ack cycle, sleeping `poll_interval` when the
    /// batch comes back empty so an idle stream doesn't spin the CPU.
    async fn poll_once(&self) {
        match self.stream.consume(CONSUMER_GROUP, &self.config.consumer_id, self.config.batch_size).await {
            Ok(messages) if messages.is_empty() => {
                tokio::time::sleep(self.config.poll_interval).await;
            }
            Ok(messages) => {
                for message in messages {
                    self.handle_message(message).await;
                }
            }
            Err(err) => {
                warn!(%err, "trigger engine failed to consume from the durable stream");
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
    }

    #[instrument(skip(self, message), fields(event_id = %message.event.id, event_type = %message.event.event_type))]
    async fn handle_message(&self, message: StreamMessage) {
        let StreamMessage { message_id, event, .. } = message;

        match self.dispatch(&event).await {
            Ok(enqueued) => {
                debug!(enqueued, "processed event");
            }
            Err(err) => {
                warn!(%err, "failed to look up bindings for event; message will be redelivered");
                return;
            }
        }

        if let Err(err) = self.stream.ack(CONSUMER_GROUP, &message_id).await {
            warn!(%err, %message_id, "failed to ack processed event");
        }
    }

    /// Looks up bindings, evaluates predicates in priority order and
    /// enqueues a job per match. Returns the number of jobs enqueued.
    async fn dispatch(&self, event: &Event) -> Result<usize, TriggerError> {
        let mut bindings =
            self.store.list_active_bindings(event.organization_id, &event.event_type).await?;
        bindings.sort_by_key(PlaybookBinding::ordering_key);

        let mut enqueued = 0;
        for binding in &bindings {
            if self.matches(binding, &event.data) {
                soar_core::metrics::record_binding_matched(&binding.playbook_id.to_string());
                self.enqueue_for_binding(binding, event);
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// A binding with no predicate always matches (spec §4.2 step 3); the
    /// predicate grammar has no bare-boolean literal, so "always" is this
    /// explicit branch rather than evaluating a synthetic `"true"` string.
    fn matches(&self, binding: &PlaybookBinding, data: &Value) -> bool {
        match &binding.predicate {
            Some(expression) => predicate::evaluate(expression, data),
            None => true,
        }
    }

    fn enqueue_for_binding(&self, binding: &PlaybookBinding, event: &Event) {
        let job = PlaybookJob::new(binding.playbook_id, event.clone(), binding.priority);
        self.queue.enqueue(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soar_contracts::event::EntityType;
    use soar_contracts::playbook::Playbook;
    use soar_contracts::prelude::AuditLogEntry;
    use soar_contracts::value::Value;
    use soar_storage::memory::InMemoryRelationalStore;
    use soar_storage::stream::InMemoryEventStream;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeStore {
        bindings: Vec<PlaybookBinding>,
    }

    #[async_trait::async_trait]
    impl RelationalStore for FakeStore {
        async fn get_playbook(&self, _id: i64) -> Result<Option<Playbook>, StoreError> {
            Ok(None)
        }
        async fn insert_execution(
            &self,
            _execution: soar_contracts::execution::PlaybookExecution,
        ) -> Result<i64, StoreError> {
            Ok(1)
        }
        async fn update_execution_status(
            &self,
            _id: i64,
            _status: soar_contracts::execution::ExecutionStatus,
            _update: soar_storage::store::ExecutionStatusUpdate,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_execution(
            &self,
            _id: i64,
        ) -> Result<Option<soar_contracts::execution::PlaybookExecution>, StoreError> {
            Ok(None)
        }
        async fn list_active_bindings(
            &self,
            _organization_id: i64,
            _event_type: &str,
        ) -> Result<Vec<PlaybookBinding>, StoreError> {
            Ok(self.bindings.clone())
        }
        async fn append_audit_log(&self, _entry: AuditLogEntry) -> Result<(), StoreError> {
            Ok(())
        }
        async fn query_execution_audit_logs(
            &self,
            _execution_id: i64,
            _organization_id: i64,
        ) -> Result<Vec<AuditLogEntry>, StoreError> {
            Ok(vec![])
        }
    }

    fn binding(id: i64, playbook_id: i64, priority: i32, predicate: Option<&str>) -> PlaybookBinding {
        PlaybookBinding {
            id,
            organization_id: 1,
            event_type: "alert.created".into(),
            playbook_id,
            predicate: predicate.map(str::to_string),
            priority,
            is_active: true,
        }
    }

    #[allow(dead_code)]
    fn unused_counter() -> AtomicI64 {
        AtomicI64::new(0)
    }

    #[tokio::test]
    async fn matches_binding_with_no_predicate() {
        let store: Arc<dyn RelationalStore> =
            Arc::new(FakeStore { bindings: vec![binding(1, 100, 5, None)] });
        let stream: Arc<dyn DurableEventStream> = Arc::new(InMemoryEventStream::default());
        let queue = Arc::new(JobQueue::new());
        let engine = TriggerEngine::new(stream, store, queue.clone(), TriggerEngineConfig::default());

        let event = Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object());
        let enqueued = engine.dispatch(&event).await.unwrap();

        assert_eq!(enqueued, 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn skips_binding_whose_predicate_fails() {
        let store: Arc<dyn RelationalStore> = Arc::new(FakeStore {
            bindings: vec![binding(1, 100, 5, Some("severity == \"critical\""))],
        });
        let stream: Arc<dyn DurableEventStream> = Arc::new(InMemoryEventStream::default());
        let queue = Arc::new(JobQueue::new());
        let engine = TriggerEngine::new(stream, store, queue.clone(), TriggerEngineConfig::default());

        let event = Event::new(
            "e1",
            "alert.created",
            1,
            EntityType::Alert,
            1,
            serde_json::json!({"severity": "low"}).into(),
        );
        let enqueued = engine.dispatch(&event).await.unwrap();

        assert_eq!(enqueued, 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn enqueues_in_priority_order_for_multiple_bindings() {
        let store: Arc<dyn RelationalStore> = Arc::new(FakeStore {
            bindings: vec![binding(2, 200, 1, None), binding(1, 100, 10, None)],
        });
        let stream: Arc<dyn DurableEventStream> = Arc::new(InMemoryEventStream::default());
        let queue = Arc::new(JobQueue::new());
        let engine = TriggerEngine::new(stream, store, queue.clone(), TriggerEngineConfig::default());

        let event = Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object());
        engine.dispatch(&event).await.unwrap();

        assert_eq!(queue.dequeue().await.playbook_id, 100);
        assert_eq!(queue.dequeue().await.playbook_id, 200);
    }

    #[tokio::test]
    async fn poll_once_acks_after_successful_dispatch() {
        let store: Arc<dyn RelationalStore> =
            Arc::new(FakeStore { bindings: vec![binding(1, 100, 5, None)] });
        let stream = Arc::new(InMemoryEventStream::default());
        let event = Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object());
        stream.publish(event).await.unwrap();

        let queue = Arc::new(JobQueue::new());
        let engine = TriggerEngine::new(stream.clone(), store, queue.clone(), TriggerEngineConfig::default());

        engine.poll_once().await;
        assert_eq!(queue.len(), 1);

        let redelivered = stream.consume(CONSUMER_GROUP, "other-consumer", 10).await.unwrap();
        assert!(redelivered.is_empty(), "acked message must not be redelivered");
    }

    #[tokio::test]
    async fn in_memory_relational_store_satisfies_dispatch() {
        let store: Arc<dyn RelationalStore> = Arc::new(InMemoryRelationalStore::default());
        let stream: Arc<dyn DurableEventStream> = Arc::new(InMemoryEventStream::default());
        let queue = Arc::new(JobQueue::new());
        let engine = TriggerEngine::new(stream, store, queue.clone(), TriggerEngineConfig::default());

        let event = Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object());
        let enqueued = engine.dispatch(&event).await.unwrap();
        assert_eq!(enqueued, 0);
    }
}
