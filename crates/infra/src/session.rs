//! Per-request persistence scope.
//!
//! A [`Session`] is the scope context the mediator hands to every behavior
//! and handler. It owns:
//!
//! - the **change tracker**: every aggregate loaded or added during the
//!   request, in first-tracked order, with an identity map on top
//! - the **transaction**: when open, persistence writes are staged here and
//!   only reach the database on commit
//! - the **unit of work**: `save` drains queued events, publishes them
//!   through the mediator and persists the tracked aggregates
//!
//! Sessions are never shared between concurrent requests; open one per
//! request from a [`SessionFactory`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mediary_core::{AggregateRoot, EntityId, Notification, PendingEvent};
use mediary_events::{Mediator, MediatorError, MediatorResult, Request};

use crate::config::{PublishPolicy, UnitOfWorkConfig};
use crate::repository::Repository;
use crate::store::{Database, RecordKey, StoreError, WriteBatch};
use crate::tracked::{Tracked, TrackedAggregate};
use crate::unit_of_work::UnitOfWork;

/// Opens sessions that share one mediator, database and configuration.
#[derive(Clone)]
pub struct SessionFactory {
    mediator: Mediator<Session>,
    database: Arc<dyn Database>,
    config: UnitOfWorkConfig,
}

impl SessionFactory {
    pub fn new(
        mediator: Mediator<Session>,
        database: Arc<dyn Database>,
        config: UnitOfWorkConfig,
    ) -> Self {
        Self {
            mediator,
            database,
            config,
        }
    }

    pub fn open(&self) -> Session {
        Session::new(
            self.mediator.clone(),
            Arc::clone(&self.database),
            self.config,
        )
    }

    /// Send `request` in a fresh session.
    pub async fn send<R: Request>(
        &self,
        request: R,
        ct: &CancellationToken,
    ) -> MediatorResult<R::Response> {
        self.open().send(request, ct).await
    }

    pub fn mediator(&self) -> &Mediator<Session> {
        &self.mediator
    }
}

impl core::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("mediator", &self.mediator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub struct Session {
    mediator: Mediator<Session>,
    database: Arc<dyn Database>,
    config: UnitOfWorkConfig,
    opened_at: DateTime<Utc>,
    tracker: Mutex<Vec<Box<dyn TrackedAggregate>>>,
    /// Writes staged by the open transaction, in staging order.
    transaction: Mutex<Option<WriteBatch>>,
}

impl Session {
    pub fn new(
        mediator: Mediator<Session>,
        database: Arc<dyn Database>,
        config: UnitOfWorkConfig,
    ) -> Self {
        Self {
            mediator,
            database,
            config,
            opened_at: Utc::now(),
            tracker: Mutex::new(Vec::new()),
            transaction: Mutex::new(None),
        }
    }

    /// Send `request` with this session as its scope.
    pub async fn send<R: Request>(
        &self,
        request: R,
        ct: &CancellationToken,
    ) -> MediatorResult<R::Response> {
        self.mediator.send(request, self, ct).await
    }

    pub async fn publish<N: Notification>(
        &self,
        notification: &N,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        self.mediator.publish(notification, self, ct).await
    }

    pub fn repository<A>(&self) -> Repository<'_, A>
    where
        A: AggregateRoot + Serialize + DeserializeOwned + Send + 'static,
    {
        Repository::new(self)
    }

    pub fn mediator(&self) -> &Mediator<Session> {
        &self.mediator
    }

    pub fn config(&self) -> UnitOfWorkConfig {
        self.config
    }

    /// Fixed for the session's lifetime; every handler in it sees the same value.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Number of aggregates in the change tracker.
    pub fn tracked_count(&self) -> usize {
        self.lock_tracker().len()
    }

    pub fn in_transaction(&self) -> bool {
        self.lock_transaction().is_some()
    }

    /// Load an aggregate, going through the identity map first.
    pub(crate) async fn load<A>(
        &self,
        id: EntityId,
        ct: &CancellationToken,
    ) -> MediatorResult<Option<Tracked<A>>>
    where
        A: AggregateRoot + Serialize + DeserializeOwned + Send + 'static,
    {
        if ct.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }
        if id.is_unset() {
            return Ok(None);
        }

        let key = RecordKey::new(A::AGGREGATE_TYPE, id);
        if let Some(tracked) = self.find_tracked::<A>(key) {
            return Ok(Some(tracked));
        }

        let Some(document) = self.database.load(&key, ct).await? else {
            debug!(aggregate_type = A::AGGREGATE_TYPE, id = %id, "aggregate not found");
            return Ok(None);
        };
        let aggregate: A = serde_json::from_value(document).map_err(StoreError::from)?;

        // Another load of the same key may have completed while this one awaited.
        if let Some(tracked) = self.find_tracked::<A>(key) {
            return Ok(Some(tracked));
        }
        debug!(aggregate_type = A::AGGREGATE_TYPE, id = %id, "aggregate loaded");
        Ok(Some(self.track(aggregate)))
    }

    /// Start tracking `aggregate`; it is written by the next save.
    pub(crate) fn track<A>(&self, aggregate: A) -> Tracked<A>
    where
        A: AggregateRoot + Serialize + Send + 'static,
    {
        let tracked = Tracked::new(aggregate);
        self.lock_tracker().push(Box::new(tracked.clone()));
        tracked
    }

    /// Open a transaction. Returns `false` if one is already open, in which
    /// case the caller joins it and must not commit or roll it back.
    pub(crate) fn begin_transaction(&self) -> bool {
        let mut transaction = self.lock_transaction();
        if transaction.is_some() {
            return false;
        }
        *transaction = Some(WriteBatch::new());
        true
    }

    /// Apply every staged write as one batch and close the transaction.
    ///
    /// The transaction is closed even if the write fails; in that case it is
    /// rolled back as by [`rollback_transaction`](Self::rollback_transaction).
    pub(crate) async fn commit_transaction(&self, ct: &CancellationToken) -> MediatorResult<()> {
        let staged = self.lock_transaction().take();
        let Some(staged) = staged else {
            return Ok(());
        };
        if staged.is_empty() {
            return Ok(());
        }

        let records = staged.len();
        if let Err(err) = self.database.write(staged, ct).await {
            self.detach_all();
            return Err(err.into());
        }
        debug!(records, "transaction committed");
        Ok(())
    }

    /// Discard the staged writes and detach every tracked aggregate, so a
    /// later save on this session cannot write the rolled-back changes.
    /// Returns whether a transaction was open.
    pub(crate) fn rollback_transaction(&self) -> bool {
        let was_open = self.lock_transaction().take().is_some();
        if was_open {
            self.detach_all();
        }
        was_open
    }

    fn detach_all(&self) {
        let detached = std::mem::take(&mut *self.lock_tracker()).len();
        if detached > 0 {
            debug!(detached, "tracked aggregates detached");
        }
    }

    fn find_tracked<A>(&self, key: RecordKey) -> Option<Tracked<A>>
    where
        A: AggregateRoot + Serialize + Send + 'static,
    {
        self.lock_tracker()
            .iter()
            .filter(|entry| entry.key() == key)
            .find_map(|entry| entry.as_handle().downcast_ref::<Tracked<A>>().cloned())
    }

    /// Steps 1-3: scan, collect and clear, in tracker order.
    fn drain_pending_events(&self) -> Vec<PendingEvent> {
        self.lock_tracker()
            .iter()
            .flat_map(|entry| entry.take_pending_events())
            .collect()
    }

    async fn publish_events(
        &self,
        events: &[PendingEvent],
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        let mut first_error = None;
        for event in events {
            match self.mediator.publish_dyn(event.as_ref(), self, ct).await {
                Ok(()) => {}
                Err(MediatorError::Cancelled) => return Err(MediatorError::Cancelled),
                Err(err) => {
                    warn!(
                        notification = event.notification_type(),
                        error = %err,
                        "publishing queued event failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn persist(&self, ct: &CancellationToken) -> MediatorResult<()> {
        let batch = self.collect_batch()?;
        if batch.is_empty() {
            return Ok(());
        }

        let Some(batch) = self.stage(batch) else {
            debug!("changes staged in transaction");
            return Ok(());
        };
        let records = batch.len();
        self.database.write(batch, ct).await?;
        debug!(records, "changes persisted");
        Ok(())
    }

    fn collect_batch(&self) -> Result<WriteBatch, StoreError> {
        let tracker = self.lock_tracker();
        let mut batch = WriteBatch::new();
        for entry in tracker.iter() {
            batch.push(entry.to_record(self.database.as_ref())?);
        }
        Ok(batch)
    }

    /// Stage `batch` in the open transaction, or hand it back if there is none.
    fn stage(&self, batch: WriteBatch) -> Option<WriteBatch> {
        match self.lock_transaction().as_mut() {
            Some(staged) => {
                staged.extend(batch);
                None
            }
            None => Some(batch),
        }
    }

    fn lock_tracker(&self) -> MutexGuard<'_, Vec<Box<dyn TrackedAggregate>>> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_transaction(&self) -> MutexGuard<'_, Option<WriteBatch>> {
        self.transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UnitOfWork for Session {
    async fn save(&self, ct: &CancellationToken) -> MediatorResult<()> {
        if ct.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }

        let events = self.drain_pending_events();
        let policy = self.config.publish_policy;
        debug!(events = events.len(), policy = %policy, "saving changes");

        match policy {
            PublishPolicy::PublishThenPersist => {
                self.publish_events(&events, ct).await?;
                self.persist(ct).await
            }
            PublishPolicy::PersistThenPublish => {
                self.persist(ct).await?;
                self.publish_events(&events, ct).await
            }
        }
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("tracked", &self.tracked_count())
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use mediary_core::{DomainError, Entity};
    use mediary_events::{MediatorBuilder, NotificationHandler};
    use mediary_parties::Buyer;
    use mediary_sales::{Order, OrderCreated};

    use super::*;
    use crate::store::InMemoryDatabase;

    /// Records every `OrderCreated` it sees, plus whether the order was
    /// already in the database at that moment.
    #[derive(Clone, Default)]
    struct Observer {
        seen: Arc<Mutex<Vec<(String, bool)>>>,
        database: Arc<InMemoryDatabase>,
    }

    impl Observer {
        fn seen(&self) -> Vec<(String, bool)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationHandler<OrderCreated, Session> for Observer {
        async fn handle(
            &self,
            notification: &OrderCreated,
            _session: &Session,
            _ct: &CancellationToken,
        ) -> MediatorResult<()> {
            let persisted = !self.database.is_empty();
            self.seen
                .lock()
                .unwrap()
                .push((notification.name.clone(), persisted));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationHandler<OrderCreated, Session> for Failing {
        async fn handle(
            &self,
            _notification: &OrderCreated,
            _session: &Session,
            _ct: &CancellationToken,
        ) -> MediatorResult<()> {
            Err(DomainError::validation("rejected").into())
        }
    }

    /// Adds a buyer and saves from inside the outer save.
    #[derive(Clone)]
    struct NestedSaver {
        database: Arc<InMemoryDatabase>,
        writes_after_nested_save: Arc<Mutex<Option<usize>>>,
    }

    #[async_trait]
    impl NotificationHandler<OrderCreated, Session> for NestedSaver {
        async fn handle(
            &self,
            _notification: &OrderCreated,
            session: &Session,
            ct: &CancellationToken,
        ) -> MediatorResult<()> {
            let buyers = session.repository::<Buyer>();
            buyers.add(Buyer::new("nested"));
            buyers.unit_of_work().save(ct).await?;
            *self.writes_after_nested_save.lock().unwrap() =
                Some(self.database.write_log().len());
            Ok(())
        }
    }

    fn session_with(
        database: &Arc<InMemoryDatabase>,
        policy: PublishPolicy,
        register: impl FnOnce(&mut MediatorBuilder<Session>),
    ) -> Session {
        let mut builder = Mediator::<Session>::builder();
        register(&mut builder);
        Session::new(
            builder.build(),
            database.clone(),
            UnitOfWorkConfig::default().with_publish_policy(policy),
        )
    }

    fn created(name: &str) -> OrderCreated {
        OrderCreated {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn loading_twice_returns_the_tracked_instance() {
        let database = Arc::new(InMemoryDatabase::new());
        database.insert(Order::new("O-3"), EntityId::new(3)).unwrap();
        let session = session_with(&database, PublishPolicy::default(), |_| {});
        let ct = CancellationToken::new();

        let orders = session.repository::<Order>();
        let first = orders.get(EntityId::new(3), &ct).await.unwrap();
        first.update(|order| order.renumber("changed"));
        let second = orders.get(EntityId::new(3), &ct).await.unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(second.read(|order| order.number().to_string()), "changed");
        assert_eq!(session.tracked_count(), 1);
    }

    #[tokio::test]
    async fn missing_aggregate_is_a_handler_failure() {
        let database = Arc::new(InMemoryDatabase::new());
        let session = session_with(&database, PublishPolicy::default(), |_| {});
        let ct = CancellationToken::new();

        let err = session
            .repository::<Order>()
            .get(EntityId::new(42), &ct)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediatorError::HandlerFailed(DomainError::NotFound { id, .. }) if id == EntityId::new(42)
        ));
        assert_eq!(session.tracked_count(), 0);
    }

    #[tokio::test]
    async fn save_drains_publishes_and_assigns_ids() {
        let database = Arc::new(InMemoryDatabase::new());
        let observer = Observer {
            database: database.clone(),
            ..Observer::default()
        };
        let session = session_with(&database, PublishPolicy::PublishThenPersist, |b| {
            b.register_notification_handler::<OrderCreated, _>(observer.clone());
        });
        let ct = CancellationToken::new();

        let mut order = Order::new("P-1");
        order.add_detail(5).unwrap();
        order.add_detail(7).unwrap();
        order.raise(created("P-1"));
        let order = session.repository::<Order>().add(order);

        session.save(&ct).await.unwrap();

        assert!(!order.read(|o| o.has_pending_events()));
        assert_eq!(observer.seen(), vec![("P-1".to_string(), false)]);

        let id = order.id();
        assert_eq!(id, EntityId::new(1));
        let detail_ids: Vec<EntityId> = order.read(|o| o.details().iter().map(|d| d.id()).collect());
        assert_eq!(detail_ids, vec![EntityId::new(1), EntityId::new(2)]);

        let stored = database.get::<Order>(id).unwrap().unwrap();
        assert_eq!(stored.number(), "P-1");
        assert_eq!(stored.details().len(), 2);
    }

    #[tokio::test]
    async fn persist_then_publish_writes_before_handlers_run() {
        let database = Arc::new(InMemoryDatabase::new());
        let observer = Observer {
            database: database.clone(),
            ..Observer::default()
        };
        let session = session_with(&database, PublishPolicy::PersistThenPublish, |b| {
            b.register_notification_handler::<OrderCreated, _>(observer.clone());
        });
        let ct = CancellationToken::new();

        let mut order = Order::new("P-2");
        order.raise(created("P-2"));
        session.repository::<Order>().add(order);
        session.save(&ct).await.unwrap();

        assert_eq!(observer.seen(), vec![("P-2".to_string(), true)]);
    }

    #[tokio::test]
    async fn failed_publish_skips_the_write_but_runs_every_handler() {
        let database = Arc::new(InMemoryDatabase::new());
        let observer = Observer {
            database: database.clone(),
            ..Observer::default()
        };
        let session = session_with(&database, PublishPolicy::PublishThenPersist, |b| {
            b.register_notification_handler::<OrderCreated, _>(Failing)
                .register_notification_handler::<OrderCreated, _>(observer.clone());
        });
        let ct = CancellationToken::new();

        let mut order = Order::new("P-3");
        order.raise(created("first"));
        order.raise(created("second"));
        let order = session.repository::<Order>().add(order);

        let err = session.save(&ct).await.unwrap_err();

        assert!(matches!(err, MediatorError::HandlerFailed(DomainError::Validation(_))));
        let names: Vec<String> = observer.seen().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(database.is_empty());
        assert!(!order.read(|o| o.has_pending_events()));
    }

    #[tokio::test]
    async fn nested_save_persists_before_the_outer_one() {
        let database = Arc::new(InMemoryDatabase::new());
        let nested = NestedSaver {
            database: database.clone(),
            writes_after_nested_save: Arc::default(),
        };
        let session = session_with(&database, PublishPolicy::PublishThenPersist, |b| {
            b.register_notification_handler::<OrderCreated, _>(nested.clone());
        });
        let ct = CancellationToken::new();

        let mut order = Order::new("P-4");
        order.raise(created("P-4"));
        session.repository::<Order>().add(order);
        session.save(&ct).await.unwrap();

        assert_eq!(*nested.writes_after_nested_save.lock().unwrap(), Some(1));
        let log = database.write_log();
        assert_eq!(log.len(), 2);
        let inner: Vec<&str> = log[0].keys().iter().map(|k| k.aggregate_type).collect();
        assert_eq!(inner, vec!["sales.order", "parties.buyer"]);
        assert_eq!(log[1].len(), 2);
    }

    #[tokio::test]
    async fn transaction_stages_writes_until_commit() {
        let database = Arc::new(InMemoryDatabase::new());
        let session = session_with(&database, PublishPolicy::default(), |_| {});
        let ct = CancellationToken::new();

        assert!(session.begin_transaction());
        assert!(!session.begin_transaction());
        session.repository::<Order>().add(Order::new("T-1"));
        session.save(&ct).await.unwrap();
        session.save(&ct).await.unwrap();
        assert!(database.is_empty());

        session.commit_transaction(&ct).await.unwrap();
        assert!(!session.in_transaction());
        assert_eq!(database.len(), 1);
        assert_eq!(database.write_log().len(), 1);
        assert_eq!(database.write_log()[0].len(), 2);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let database = Arc::new(InMemoryDatabase::new());
        let session = session_with(&database, PublishPolicy::default(), |_| {});
        let ct = CancellationToken::new();

        session.begin_transaction();
        session.repository::<Buyer>().add(Buyer::new("gone"));
        session.save(&ct).await.unwrap();

        assert!(session.rollback_transaction());
        assert_eq!(session.tracked_count(), 0);
        assert!(!session.rollback_transaction());
        session.commit_transaction(&ct).await.unwrap();
        session.save(&ct).await.unwrap();
        assert!(database.is_empty());
    }

    #[tokio::test]
    async fn loading_after_a_rollback_reads_the_stored_state() {
        let database = Arc::new(InMemoryDatabase::new());
        database.insert(Order::new("O-3"), EntityId::new(3)).unwrap();
        let session = session_with(&database, PublishPolicy::default(), |_| {});
        let ct = CancellationToken::new();

        session.begin_transaction();
        let orders = session.repository::<Order>();
        let discarded = orders.get(EntityId::new(3), &ct).await.unwrap();
        discarded.update(|order| order.renumber("discarded"));
        session.save(&ct).await.unwrap();
        session.rollback_transaction();

        let reloaded = orders.get(EntityId::new(3), &ct).await.unwrap();
        assert!(!reloaded.ptr_eq(&discarded));
        assert_eq!(reloaded.read(|order| order.number().to_string()), "O-3");
    }

    #[tokio::test]
    async fn cancelled_save_leaves_events_queued() {
        let database = Arc::new(InMemoryDatabase::new());
        let session = session_with(&database, PublishPolicy::default(), |_| {});
        let ct = CancellationToken::new();
        ct.cancel();

        let mut order = Order::new("C-1");
        order.raise(created("C-1"));
        let order = session.repository::<Order>().add(order);

        assert!(session.save(&ct).await.unwrap_err().is_cancelled());
        assert!(order.read(|o| o.has_pending_events()));
        assert!(database.is_empty());
    }

    /// Cancels the token from inside the fan-out.
    struct Canceller;

    #[async_trait]
    impl NotificationHandler<OrderCreated, Session> for Canceller {
        async fn handle(
            &self,
            _notification: &OrderCreated,
            _session: &Session,
            ct: &CancellationToken,
        ) -> MediatorResult<()> {
            ct.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancellation_during_publish_skips_remaining_events_and_the_write() {
        let database = Arc::new(InMemoryDatabase::new());
        let observer = Observer {
            database: database.clone(),
            ..Observer::default()
        };
        let session = session_with(&database, PublishPolicy::PublishThenPersist, |b| {
            b.register_notification_handler::<OrderCreated, _>(Canceller)
                .register_notification_handler::<OrderCreated, _>(observer.clone());
        });
        let ct = CancellationToken::new();

        let mut order = Order::new("C-2");
        order.raise(created("first"));
        order.raise(created("second"));
        session.repository::<Order>().add(order);

        assert!(session.save(&ct).await.unwrap_err().is_cancelled());
        assert!(observer.seen().is_empty());
        assert!(database.is_empty());
        assert!(database.write_log().is_empty());
    }

    #[test]
    fn session_reports_its_state_in_debug_output() {
        let database = Arc::new(InMemoryDatabase::new());
        let session = session_with(&database, PublishPolicy::PersistThenPublish, |_| {});
        let rendered = format!("{session:?}");
        assert!(rendered.contains("PersistThenPublish"));
        assert!(rendered.contains("tracked: 0"));
        assert!(rendered.contains("in_transaction: false"));
    }
}
