//! Aggregate document storage.

mod in_memory;
mod r#trait;

pub use in_memory::InMemoryDatabase;
pub use r#trait::{Database, Record, RecordKey, StoreError, WriteBatch};
