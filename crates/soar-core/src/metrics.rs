//! Counters and histograms for the execution core (spec §6, "Audit + Metrics").
//!
//! This module only records measurements through the `metrics` facade; it
//! does not install a recorder. `soar-server` installs the Prometheus
//! exporter at startup and scrapes the process-wide registry these
//! functions write into.

use std::time::Instant;

/// RAII guard that records a histogram observation (in seconds) when dropped.
pub struct TimingGuard {
    name: &'static str,
    start: Instant,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        metrics::histogram!(self.name).record(self.start.elapsed().as_secs_f64());
    }
}

/// Events appended to the durable stream.
pub fn record_event_published() {
    metrics::counter!("soar_events_published_total").increment(1);
}

/// Bindings whose predicate matched a polled event.
pub fn record_binding_matched(playbook_id: &str) {
    metrics::counter!("soar_bindings_matched_total", "playbook_id" => playbook_id.to_string())
        .increment(1);
}

/// A job completed, successfully or not, with its final outcome.
pub fn record_job_outcome(outcome: &str) {
    metrics::counter!("soar_jobs_total", "outcome" => outcome.to_string()).increment(1);
}

/// Wall-clock time a single playbook step spent executing, including retries.
pub fn step_timer() -> TimingGuard {
    TimingGuard::new("soar_step_duration_seconds")
}

/// A step reached a terminal outcome (completed, recovered, skipped, stopped).
pub fn record_step_outcome(outcome: &str) {
    metrics::counter!("soar_steps_total", "outcome" => outcome.to_string()).increment(1);
}

/// Depth of the job queue immediately after an enqueue or dequeue.
pub fn record_queue_depth(depth: u64) {
    metrics::gauge!("soar_job_queue_depth").set(depth as f64);
}
