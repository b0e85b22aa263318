use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use mediary_core::{AggregateRoot, DomainError, EntityId};
use mediary_events::MediatorResult;

use crate::session::Session;
use crate::tracked::Tracked;
use crate::unit_of_work::UnitOfWork;

/// Aggregate-root repository scoped to one [`Session`].
///
/// Only aggregate roots are loaded and added here; owned entities are
/// reached through their root.
pub struct Repository<'s, A> {
    session: &'s Session,
    _aggregate: PhantomData<fn() -> A>,
}

impl<'s, A> Repository<'s, A>
where
    A: AggregateRoot + Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            _aggregate: PhantomData,
        }
    }

    /// Load `id`, failing with `NotFound` if it does not exist.
    pub async fn get(&self, id: EntityId, ct: &CancellationToken) -> MediatorResult<Tracked<A>> {
        self.find(id, ct)
            .await?
            .ok_or_else(|| DomainError::not_found(A::AGGREGATE_TYPE, id).into())
    }

    pub async fn find(
        &self,
        id: EntityId,
        ct: &CancellationToken,
    ) -> MediatorResult<Option<Tracked<A>>> {
        self.session.load(id, ct).await
    }

    /// Track a new aggregate; it gets its identity on the next save.
    pub fn add(&self, aggregate: A) -> Tracked<A> {
        self.session.track(aggregate)
    }

    pub fn unit_of_work(&self) -> &'s dyn UnitOfWork {
        self.session
    }
}
