use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mediary_core::Notification;
use mediary_events::{MediatorError, MediatorResult, NotificationHandler, Request, RequestHandler};

use crate::config::HandlerConfig;
use crate::session::Session;

/// One unit of background work; answers with the time its session opened.
#[derive(Debug, Clone, Default)]
pub struct DoWork;

impl Request for DoWork {
    type Response = DateTime<Utc>;
}

/// Published directly by [`DoWorkHandler`], not queued on an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDone {
    pub session_opened_at: DateTime<Utc>,
}

impl Notification for WorkDone {
    fn notification_type(&self) -> &'static str {
        "jobs.work.done"
    }
}

async fn work(delay: Duration, ct: &CancellationToken) -> MediatorResult<()> {
    tokio::select! {
        _ = ct.cancelled() => Err(MediatorError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct DoWorkHandler {
    delay: Duration,
}

impl DoWorkHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            delay: config.work_delay,
        }
    }
}

#[async_trait]
impl RequestHandler<DoWork, Session> for DoWorkHandler {
    async fn handle(
        &self,
        _request: DoWork,
        session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<DateTime<Utc>> {
        work(self.delay, ct).await?;

        let opened_at = session.opened_at();
        session
            .publish(
                &WorkDone {
                    session_opened_at: opened_at,
                },
                ct,
            )
            .await?;
        Ok(opened_at)
    }
}

#[derive(Debug, Clone)]
pub struct WorkDoneHandler {
    delay: Duration,
}

impl WorkDoneHandler {
    pub fn new(config: &HandlerConfig) -> Self {
        Self {
            delay: config.work_delay,
        }
    }
}

#[async_trait]
impl NotificationHandler<WorkDone, Session> for WorkDoneHandler {
    async fn handle(
        &self,
        notification: &WorkDone,
        session: &Session,
        ct: &CancellationToken,
    ) -> MediatorResult<()> {
        work(self.delay, ct).await?;
        debug!(
            session_opened_at = %notification.session_opened_at,
            same_session = notification.session_opened_at == session.opened_at(),
            "work done"
        );
        Ok(())
    }
}
