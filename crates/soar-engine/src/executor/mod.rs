//! Playbook executor (spec §4.4, §7): the sequential step-loop interpreter
//! that drives playbook jobs to completion.

mod interpreter;

pub use interpreter::{ExecutorConfig, PlaybookExecutor};
