//! The unit of work the job queue schedules: one playbook run triggered by
//! one event (spec §4.3 "Enqueue contract").

use soar_contracts::event::Event;
use soar_contracts::value::Value;

#[derive(Debug, Clone)]
pub struct PlaybookJob {
    /// Assigned by `JobQueue::enqueue`; `0` before enqueue.
    pub id: u64,
    pub playbook_id: i64,
    pub organization_id: i64,
    pub user_id: Option<i64>,
    pub trigger_event: Event,
    pub context: Value,
    pub priority: i32,
    /// Execution runs against the mock action registry and is tagged `test`
    /// in audit (spec §4.4 "Test mode").
    pub dry_run: bool,
}

impl PlaybookJob {
    pub fn new(playbook_id: i64, trigger_event: Event, priority: i32) -> Self {
        Self {
            id: 0,
            organization_id: trigger_event.organization_id,
            playbook_id,
            user_id: None,
            context: Value::object(),
            trigger_event,
            priority,
            dry_run: false,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn as_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}
