//! Storage collaborators the execution core depends on but doesn't own:
//! the relational store and the durable event stream (spec §6).

pub mod memory;
pub mod postgres;
pub mod store;
pub mod stream;

pub mod prelude {
    pub use crate::memory::InMemoryRelationalStore;
    pub use crate::postgres::PostgresRelationalStore;
    pub use crate::store::{ExecutionStatusUpdate, RelationalStore, StoreError};
    pub use crate::stream::{DurableEventStream, InMemoryEventStream, StreamError, StreamMessage};
}
