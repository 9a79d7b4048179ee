//! Persistent execution records and in-memory execution state (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Aborted,
}

/// A persisted run of a playbook.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaybookExecution {
    pub id: i64,
    pub playbook_id: i64,
    pub organization_id: i64,
    pub user_id: Option<i64>,
    #[schema(value_type = Object)]
    pub trigger_data: Value,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Serialized `ExecutionState` snapshot.
    #[schema(value_type = Object)]
    pub results: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

/// Per-step bookkeeping inside an execution's live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    pub attempts: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl StepRecord {
    pub fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            attempts: 0,
            start_time: None,
            end_time: None,
            output: None,
            error: None,
        }
    }
}

/// A snapshot of execution variables taken just before a step begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step_id: String,
    pub timestamp: DateTime<Utc>,
    pub variables_snapshot: Value,
}

/// Live in-memory state for one running execution; `results` on
/// [`PlaybookExecution`] is a serialized snapshot of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub variables: Value,
    pub steps: BTreeMap<String, StepRecord>,
    pub checkpoints: Vec<Checkpoint>,
    pub current_step_id: Option<String>,
    pub logs: Vec<LogLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl ExecutionState {
    pub const CHECKPOINT_RETENTION_DEFAULT: usize = 10;

    pub fn new(variables: Value) -> Self {
        let mut variables = variables;
        if variables.get_path("steps").is_none() {
            variables.set_path("steps", Value::object());
        }
        Self {
            variables,
            steps: BTreeMap::new(),
            checkpoints: Vec::new(),
            current_step_id: None,
            logs: Vec::new(),
        }
    }

    /// Push a new checkpoint, trimming to `retention` (spec invariant:
    /// `checkpoints.length <= CHECKPOINT_RETENTION`).
    pub fn push_checkpoint(&mut self, step_id: &str, retention: usize) {
        self.checkpoints.push(Checkpoint {
            step_id: step_id.to_string(),
            timestamp: Utc::now(),
            variables_snapshot: self.variables.deep_clone(),
        });
        if self.checkpoints.len() > retention {
            let excess = self.checkpoints.len() - retention;
            self.checkpoints.drain(0..excess);
        }
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, step_id: Option<String>) {
        self.logs.push(LogLine {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_id,
        });
    }

    /// Roll back to the most recent checkpoint: restore variables and reset
    /// every step whose `start_time` is after the checkpoint's timestamp to
    /// `pending` with no output/error (spec §4.4 onError=rollback).
    pub fn rollback_to_latest_checkpoint(&mut self) -> bool {
        let Some(checkpoint) = self.checkpoints.last().cloned() else {
            return false;
        };
        self.variables = checkpoint.variables_snapshot.deep_clone();
        for record in self.steps.values_mut() {
            if let Some(start) = record.start_time {
                if start > checkpoint.timestamp {
                    *record = StepRecord::pending();
                }
            }
        }
        true
    }
}
