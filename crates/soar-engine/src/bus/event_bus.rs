//! In-process fan-out of security events (spec §4.1 "Event Bus"). This is a
//! best-effort broadcast, distinct from the durable stream: a subscriber
//! that isn't listening simply misses events, and publishing never blocks
//! on slow consumers beyond the channel's fixed capacity.

use std::sync::Arc;

use soar_contracts::event::Event;
use soar_storage::stream::{DurableEventStream, StreamError};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 1024;

/// Publishes events to any number of in-process subscribers, and mirrors
/// every publish into the durable stream so at-least-once consumers (the
/// trigger engine) never depend on bus delivery alone.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish to in-process subscribers. Returns the number of receivers
    /// the event reached; `Ok(0)` just means nobody is currently listening.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).map(|n| n).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Single ingestion point for new security events: appends to the durable
/// stream first (the source of truth the trigger engine consumes), then
/// fans the same event out over the in-process bus for anything watching
/// live (spec §4.1 "Ingest").
pub struct StreamPublisher {
    stream: Arc<dyn DurableEventStream>,
    bus: EventBus,
}

impl StreamPublisher {
    pub fn new(stream: Arc<dyn DurableEventStream>, bus: EventBus) -> Self {
        Self { stream, bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Appends `event` to the durable stream and returns its stream
    /// position. The in-process bus publish is best-effort and never
    /// surfaces an error: a bus failure must not fail ingestion.
    pub async fn publish(&self, event: Event) -> Result<u64, StreamError> {
        let position = self.stream.publish(event.clone()).await?;
        soar_core::metrics::record_event_published();
        if self.bus.publish(event) == 0 {
            warn!(stream_position = position, "published event has no live bus subscribers");
        }
        Ok(position)
    }
}
