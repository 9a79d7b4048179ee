//! In-process priority queue backing the job queue (spec §4.3 "Enqueue").
//! Higher `priority` dequeues first; jobs of equal priority are FIFO via an
//! ascending sequence number, matching the spec's ordering guarantee.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::job::PlaybookJob;

struct QueuedJob {
    priority: i32,
    sequence: u64,
    job: PlaybookJob,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins; on a tie, the
        // *lower* sequence number (older) must win, so its comparison is
        // reversed relative to priority.
        self.priority.cmp(&other.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct JobQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Assigns `job.id` and enqueues it, returning the id.
    pub fn enqueue(&self, mut job: PlaybookJob) -> u64 {
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        job.id = id;
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = job.priority;
        let mut heap = self.heap.lock();
        heap.push(QueuedJob { priority, sequence, job });
        soar_core::metrics::record_queue_depth(heap.len() as u64);
        drop(heap);
        self.notify.notify_one();
        id
    }

    /// Waits for a job to be available, then pops the highest-priority one.
    pub async fn dequeue(&self) -> PlaybookJob {
        loop {
            let mut heap = self.heap.lock();
            if let Some(queued) = heap.pop() {
                soar_core::metrics::record_queue_depth(heap.len() as u64);
                return queued.job;
            }
            drop(heap);
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soar_contracts::event::{EntityType, Event};
    use soar_contracts::value::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn event() -> Event {
        Event::new("e1", "alert.created", 1, EntityType::Alert, 1, Value::object())
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let queue = JobQueue::new();
        queue.enqueue(PlaybookJob::new(1, event(), 1));
        queue.enqueue(PlaybookJob::new(2, event(), 10));

        assert_eq!(queue.dequeue().await.playbook_id, 2);
        assert_eq!(queue.dequeue().await.playbook_id, 1);
    }

    #[tokio::test]
    async fn same_priority_is_fifo() {
        let queue = JobQueue::new();
        queue.enqueue(PlaybookJob::new(1, event(), 5));
        queue.enqueue(PlaybookJob::new(2, event(), 5));
        queue.enqueue(PlaybookJob::new(3, event(), 5));

        assert_eq!(queue.dequeue().await.playbook_id, 1);
        assert_eq!(queue.dequeue().await.playbook_id, 2);
        assert_eq!(queue.dequeue().await.playbook_id, 3);
    }

    #[tokio::test]
    async fn dequeue_waits_for_a_job() {
        let queue = Arc::new(JobQueue::new());
        let waiter = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.dequeue().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(PlaybookJob::new(9, event(), 1));
        assert_eq!(waiter.await.unwrap().playbook_id, 9);
    }
}
