//! Handles to aggregates owned by a session's change tracker.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use mediary_core::{AggregateRoot, Entity, EntityId, PendingEvent};

use crate::store::{Database, Record, RecordKey, StoreError};

/// Shared handle to an aggregate tracked by a [`Session`](crate::Session).
///
/// Clones point at the same instance. Access is closure-scoped, so the
/// inner lock can never be held across an `.await`.
pub struct Tracked<A> {
    inner: Arc<Mutex<A>>,
}

impl<A> Clone for Tracked<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: core::fmt::Debug> core::fmt::Debug for Tracked<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Tracked").field(&*self.lock()).finish()
    }
}

impl<A> Tracked<A> {
    pub(crate) fn new(aggregate: A) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregate)),
        }
    }

    pub fn read<T>(&self, f: impl FnOnce(&A) -> T) -> T {
        f(&self.lock())
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut A) -> T) -> T {
        f(&mut self.lock())
    }

    /// Whether both handles refer to the same tracked instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // A panic inside `update` leaves the aggregate as the closure left it;
    // the session still owns it, so keep serving it.
    fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: Entity> Tracked<A> {
    pub fn id(&self) -> EntityId {
        self.read(|aggregate| aggregate.id())
    }
}

/// Change-tracker view of a tracked aggregate with its type erased.
pub(crate) trait TrackedAggregate: Send + Sync {
    fn key(&self) -> RecordKey;

    fn take_pending_events(&self) -> Vec<PendingEvent>;

    /// Assign identities to transient entities, then serialize the aggregate.
    fn to_record(&self, database: &dyn Database) -> Result<Record, StoreError>;

    fn as_handle(&self) -> &dyn Any;
}

impl<A> TrackedAggregate for Tracked<A>
where
    A: AggregateRoot + Serialize + Send + 'static,
{
    fn key(&self) -> RecordKey {
        RecordKey::new(A::AGGREGATE_TYPE, self.id())
    }

    fn take_pending_events(&self) -> Vec<PendingEvent> {
        self.update(|aggregate| aggregate.take_pending_events())
    }

    fn to_record(&self, database: &dyn Database) -> Result<Record, StoreError> {
        let mut aggregate = self.lock();
        if aggregate.id().is_unset() {
            let id = database.allocate_id(aggregate.entity_type())?;
            aggregate.assign_id(id);
        }
        for entity in aggregate.owned_entities_mut() {
            if entity.id().is_unset() {
                let id = database.allocate_id(entity.entity_type())?;
                entity.assign_id(id);
            }
        }

        Ok(Record {
            key: RecordKey::new(A::AGGREGATE_TYPE, aggregate.id()),
            document: serde_json::to_value(&*aggregate)?,
        })
    }

    fn as_handle(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediary_sales::{Order, OrderCreated};

    #[test]
    fn clones_share_one_instance() {
        let a = Tracked::new(Order::new("A-1"));
        let b = a.clone();
        b.update(|order| order.renumber("A-2"));

        assert_eq!(a.read(|order| order.number().to_string()), "A-2");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Tracked::new(Order::new("A-2"))));
    }

    #[test]
    fn erased_view_drains_events_and_recovers_the_handle() {
        let tracked = Tracked::new(Order::new("A-1"));
        tracked.update(|order| {
            order.raise(OrderCreated {
                name: "A-1".to_string(),
            })
        });

        let erased: Box<dyn TrackedAggregate> = Box::new(tracked.clone());
        assert_eq!(erased.take_pending_events().len(), 1);
        assert!(erased.take_pending_events().is_empty());

        let back = erased
            .as_handle()
            .downcast_ref::<Tracked<Order>>()
            .unwrap();
        assert!(back.ptr_eq(&tracked));
    }
}
