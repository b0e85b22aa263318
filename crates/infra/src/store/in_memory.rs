use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mediary_core::{AggregateRoot, EntityId};

use super::r#trait::{Database, Record, RecordKey, StoreError, WriteBatch};

/// In-memory document database.
///
/// Intended for tests/dev. Keeps a log of every applied batch so callers can
/// assert on write order, and can be told to reject writes.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    records: RwLock<BTreeMap<RecordKey, JsonValue>>,
    sequences: Mutex<HashMap<&'static str, i64>>,
    write_log: Mutex<Vec<WriteBatch>>,
    write_failure: Mutex<Option<String>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `aggregate` under `id`, assigning identities to any owned
    /// entity that has none. Seeding is not recorded in the write log.
    pub fn insert<A>(&self, mut aggregate: A, id: EntityId) -> Result<A, StoreError>
    where
        A: AggregateRoot + Serialize,
    {
        aggregate.assign_id(id);
        self.advance_sequence(aggregate.entity_type(), id)?;
        for entity in aggregate.owned_entities_mut() {
            if entity.id().is_unset() {
                let detail_id = self.allocate_id(entity.entity_type())?;
                entity.assign_id(detail_id);
            }
        }

        let document = serde_json::to_value(&aggregate)?;
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?
            .insert(RecordKey::new(A::AGGREGATE_TYPE, id), document);
        Ok(aggregate)
    }

    /// Deserialize the stored state of one aggregate.
    pub fn get<A>(&self, id: EntityId) -> Result<Option<A>, StoreError>
    where
        A: AggregateRoot + DeserializeOwned,
    {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        records
            .get(&RecordKey::new(A::AGGREGATE_TYPE, id))
            .map(|doc| serde_json::from_value(doc.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every batch applied so far, oldest first.
    pub fn write_log(&self) -> Vec<WriteBatch> {
        self.write_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reject every following write with `reason` until [`accept_writes`](Self::accept_writes).
    pub fn fail_writes(&self, reason: impl Into<String>) {
        *self
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    pub fn accept_writes(&self) {
        *self
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn advance_sequence(&self, entity_type: &'static str, id: EntityId) -> Result<(), StoreError> {
        let mut sequences = self
            .sequences
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let last = sequences.entry(entity_type).or_insert(0);
        *last = (*last).max(id.value());
        Ok(())
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn load(
        &self,
        key: &RecordKey,
        ct: &CancellationToken,
    ) -> Result<Option<JsonValue>, StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    fn allocate_id(&self, entity_type: &'static str) -> Result<EntityId, StoreError> {
        let mut sequences = self
            .sequences
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let next = sequences.entry(entity_type).or_insert(0);
        *next += 1;
        Ok(EntityId::new(*next))
    }

    async fn write(&self, batch: WriteBatch, ct: &CancellationToken) -> Result<(), StoreError> {
        if ct.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        if let Some(reason) = self
            .write_failure
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?
            .clone()
        {
            return Err(StoreError::Rejected(reason));
        }

        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        for Record { key, document } in batch.records().iter().cloned() {
            records.insert(key, document);
        }
        drop(records);

        debug!(records = batch.len(), "batch written");
        self.write_log
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?
            .push(batch);
        Ok(())
    }
}
