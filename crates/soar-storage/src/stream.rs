//! `DurableEventStream`: append-log with consumer groups and per-message ack
//! (spec §4.1). The in-memory implementation here models redelivery with a
//! pending-ack timeout, the same shape as the teacher's claim/heartbeat
//! pattern for task leases in `durable::persistence`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use soar_contracts::event::Event;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("durable persist failed: {0}")]
    PersistFailed(String),
    #[error("unknown message id: {0}")]
    UnknownMessage(String),
}

/// A message pulled from a consumer group's backlog: its durable position,
/// a redelivery handle, and the event itself.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub message_id: String,
    pub position: u64,
    pub event: Event,
}

#[async_trait]
pub trait DurableEventStream: Send + Sync {
    /// Persist `event`, blocking until acked by the log, then return its
    /// assigned monotonic stream position.
    async fn publish(&self, event: Event) -> Result<u64, StreamError>;

    /// Read the next batch (up to `max_messages`) for `group_name`/`consumer_id`,
    /// auto-creating the group at position *new* on first use.
    async fn consume(
        &self,
        group_name: &str,
        consumer_id: &str,
        max_messages: usize,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    async fn ack(&self, group_name: &str, message_id: &str) -> Result<(), StreamError>;
}

struct StoredEvent {
    position: u64,
    event: Event,
}

struct PendingDelivery {
    position: u64,
    delivered_at: Instant,
}

struct ConsumerGroup {
    /// Next undelivered stream position for this group.
    cursor: u64,
    pending: HashMap<String, PendingDelivery>,
}

/// In-memory `DurableEventStream`: an append-only `Vec<StoredEvent>` plus
/// one cursor-and-pending-set per consumer group. Unacked messages become
/// eligible for redelivery after `redelivery_timeout` elapses.
pub struct InMemoryEventStream {
    log: RwLock<Vec<StoredEvent>>,
    groups: RwLock<HashMap<String, ConsumerGroup>>,
    redelivery_timeout: Duration,
}

impl InMemoryEventStream {
    pub fn new(redelivery_timeout: Duration) -> Self {
        Self {
            log: RwLock::new(Vec::new()),
            groups: RwLock::new(HashMap::new()),
            redelivery_timeout,
        }
    }
}

impl Default for InMemoryEventStream {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn message_id(position: u64) -> String {
    format!("msg-{position}")
}

#[async_trait]
impl DurableEventStream for InMemoryEventStream {
    async fn publish(&self, event: Event) -> Result<u64, StreamError> {
        let mut log = self.log.write();
        let position = log.len() as u64;
        log.push(StoredEvent { position, event });
        Ok(position)
    }

    async fn consume(
        &self,
        group_name: &str,
        _consumer_id: &str,
        max_messages: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let log = self.log.read();
        let mut groups = self.groups.write();
        let group = groups.entry(group_name.to_string()).or_insert_with(|| ConsumerGroup {
            cursor: log.len() as u64,
            pending: HashMap::new(),
        });

        let now = Instant::now();
        let mut redelivered: Vec<StreamMessage> = Vec::new();
        let expired: Vec<String> = group
            .pending
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.delivered_at) >= self.redelivery_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(pending) = group.pending.get(&id) {
                if let Some(stored) = log.iter().find(|s| s.position == pending.position) {
                    redelivered.push(StreamMessage {
                        message_id: id.clone(),
                        position: stored.position,
                        event: stored.event.clone(),
                    });
                }
            }
            if redelivered.len() >= max_messages {
                break;
            }
        }
        for redelivered_msg in &redelivered {
            group
                .pending
                .insert(redelivered_msg.message_id.clone(), PendingDelivery {
                    position: redelivered_msg.position,
                    delivered_at: now,
                });
        }

        let mut fresh = Vec::new();
        while fresh.len() + redelivered.len() < max_messages && (group.cursor as usize) < log.len() {
            let stored = &log[group.cursor as usize];
            let id = message_id(stored.position);
            group.pending.insert(id.clone(), PendingDelivery {
                position: stored.position,
                delivered_at: now,
            });
            fresh.push(StreamMessage {
                message_id: id,
                position: stored.position,
                event: stored.event.clone(),
            });
            group.cursor += 1;
        }

        redelivered.extend(fresh);
        Ok(redelivered)
    }

    async fn ack(&self, group_name: &str, message_id: &str) -> Result<(), StreamError> {
        let mut groups = self.groups.write();
        let group = groups
            .get_mut(group_name)
            .ok_or_else(|| StreamError::UnknownMessage(message_id.to_string()))?;
        group
            .pending
            .remove(message_id)
            .ok_or_else(|| StreamError::UnknownMessage(message_id.to_string()))?;
        Ok(())
    }
}
