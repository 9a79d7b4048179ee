//! Load-aware task acceptance, shared by the job queue's worker pool.

mod backpressure;

pub use backpressure::{BackpressureConfig, BackpressureError, BackpressureState};
