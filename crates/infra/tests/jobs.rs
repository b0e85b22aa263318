//! Background job tests: one fresh session per iteration, stop on cancel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use mediary_events::{Mediator, MediatorResult, NotificationHandler};
use mediary_infra::handlers::{DoWork, WorkDone};
use mediary_infra::{
    HandlerConfig, InMemoryDatabase, JobConfig, JobHandle, JobStats, RecurringJob, Session,
    SessionFactory, TransactionCounts, TransactionStats, UnitOfWorkConfig, register_ordering,
};
use mediary_sales::CreateOrder;

type Seen = Arc<Mutex<Vec<DateTime<Utc>>>>;

/// Records the session timestamp carried by every `WorkDone`.
struct SeenWork(Seen);

#[async_trait]
impl NotificationHandler<WorkDone, Session> for SeenWork {
    async fn handle(
        &self,
        notification: &WorkDone,
        session: &Session,
        _ct: &CancellationToken,
    ) -> MediatorResult<()> {
        assert_eq!(notification.session_opened_at, session.opened_at());
        self.0.lock().unwrap().push(notification.session_opened_at);
        Ok(())
    }
}

fn work_pipeline(config: &HandlerConfig) -> (SessionFactory, Arc<TransactionStats>, Seen) {
    mediary_observability::init();
    let seen = Seen::default();
    let mut builder = Mediator::builder();
    let stats = register_ordering(&mut builder, config);
    builder.register_notification_handler::<WorkDone, _>(SeenWork(seen.clone()));
    let sessions = SessionFactory::new(
        builder.build(),
        Arc::new(InMemoryDatabase::new()),
        UnitOfWorkConfig::default(),
    );
    (sessions, stats, seen)
}

async fn wait_for(handle: &JobHandle, done: impl Fn(&JobStats) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&handle.stats()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job made no progress");
}

#[tokio::test]
async fn do_work_publishes_directly_within_its_session() {
    let config = HandlerConfig::default().with_work_delay(Duration::from_millis(1));
    let (sessions, stats, seen) = work_pipeline(&config);
    let session = sessions.open();

    let answered = session.send(DoWork, &CancellationToken::new()).await.unwrap();

    assert_eq!(answered, session.opened_at());
    assert_eq!(*seen.lock().unwrap(), vec![session.opened_at()]);
    assert_eq!(
        stats.snapshot(),
        TransactionCounts {
            begun: 1,
            committed: 1,
            rolled_back: 0,
        }
    );
}

#[tokio::test]
async fn job_opens_a_fresh_session_every_iteration() {
    let config = HandlerConfig::default().with_work_delay(Duration::from_millis(1));
    let (sessions, _, seen) = work_pipeline(&config);
    let job = RecurringJob::new(sessions, JobConfig::default().with_name("work"), || DoWork);

    let handle = job.spawn();
    wait_for(&handle, |stats| stats.succeeded >= 3).await;
    let stats = handle.shutdown().await.unwrap();

    assert_eq!(stats.failed, 0);
    assert_eq!(stats.iterations, stats.succeeded);
    let seen = seen.lock().unwrap().clone();
    assert!(seen.len() as u64 >= stats.succeeded);
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn stopping_the_job_cancels_the_request_in_flight() {
    let config = HandlerConfig::default().with_work_delay(Duration::from_secs(30));
    let (sessions, transactions, seen) = work_pipeline(&config);
    let job = RecurringJob::new(sessions, JobConfig::default(), || DoWork);

    let handle = job.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stats = tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("job ignored the stop token")
        .unwrap();

    assert_eq!(stats, JobStats::default());
    assert_eq!(transactions.snapshot().rolled_back, 1);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_iterations_are_counted_and_the_job_keeps_going() {
    // Nothing seeded: every CreateOrder fails to find its order.
    let (sessions, transactions, _) = work_pipeline(&HandlerConfig::default());
    let job = RecurringJob::new(sessions, JobConfig::default(), || CreateOrder {
        number: "J-1".to_string(),
    });

    let handle = job.spawn();
    wait_for(&handle, |stats| stats.failed >= 2).await;
    let stats = handle.shutdown().await.unwrap();

    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.iterations, stats.failed);
    assert_eq!(transactions.snapshot().committed, 0);
}

#[tokio::test]
async fn run_returns_at_once_when_already_stopped() {
    let (sessions, transactions, _) = work_pipeline(&HandlerConfig::default());
    let stop = CancellationToken::new();
    stop.cancel();

    let stats = RecurringJob::new(sessions, JobConfig::default(), || DoWork)
        .run(stop)
        .await;

    assert_eq!(stats, JobStats::default());
    assert_eq!(transactions.snapshot(), TransactionCounts::default());
}
