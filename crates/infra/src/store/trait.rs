use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use mediary_core::EntityId;
use mediary_events::MediatorError;

/// Address of one persisted aggregate document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub aggregate_type: &'static str,
    pub id: EntityId,
}

impl RecordKey {
    pub fn new(aggregate_type: &'static str, id: EntityId) -> Self {
        Self { aggregate_type, id }
    }
}

impl core::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.id)
    }
}

/// One aggregate (root and owned entities) serialized for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: RecordKey,
    pub document: JsonValue,
}

/// The documents written by one unit-of-work save.
///
/// A batch is applied atomically: either every record lands or none does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    records: Vec<Record>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Append every record of `other`, keeping its order.
    pub fn extend(&mut self, other: WriteBatch) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn keys(&self) -> Vec<RecordKey> {
        self.records.iter().map(|r| r.key).collect()
    }
}

/// Storage operation error.
///
/// These are infrastructure failures; domain failures never reach the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("store operation cancelled")]
    Cancelled,
}

impl From<StoreError> for MediatorError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Cancelled => MediatorError::Cancelled,
            other => MediatorError::persistence(other),
        }
    }
}

/// Persistence collaborator of the session.
///
/// ## Design Principles
///
/// - **Document store**: one JSON document per aggregate, keyed by [`RecordKey`]
/// - **Atomic batches**: `write` applies a whole [`WriteBatch`] or nothing
/// - **Sequences**: `allocate_id` hands out identities per entity type, starting at 1,
///   and never reuses one (even if the write that used it is rolled back)
///
/// Implementations must observe `ct` and return [`StoreError::Cancelled`]
/// once it fires.
#[async_trait]
pub trait Database: Send + Sync {
    /// Load the document stored under `key`, if any.
    async fn load(
        &self,
        key: &RecordKey,
        ct: &CancellationToken,
    ) -> Result<Option<JsonValue>, StoreError>;

    /// Next identity for a new entity of `entity_type`.
    fn allocate_id(&self, entity_type: &'static str) -> Result<EntityId, StoreError>;

    /// Apply `batch` atomically.
    async fn write(&self, batch: WriteBatch, ct: &CancellationToken) -> Result<(), StoreError>;
}
