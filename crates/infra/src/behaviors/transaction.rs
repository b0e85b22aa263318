//! Transactional pipeline behavior.
//!
//! Every request runs inside a session transaction: persistence writes made
//! by the handler (and by every nested save in the notification cascade) are
//! staged, then applied as one batch when the handler succeeds.
//!
//! ## Design
//!
//! The transaction is held by a [`TransactionGuard`]. Dropping the guard
//! without committing rolls back, which covers handler errors,
//! cancellation, panics and a request future dropped mid-flight alike.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mediary_events::{
    BoxedResponse, MediatorError, MediatorResult, Next, PipelineBehavior, RequestEnvelope,
};

use crate::session::Session;

/// Lifetime counters of the transactions a behavior opened.
#[derive(Debug, Default)]
pub struct TransactionStats {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl TransactionStats {
    pub fn snapshot(&self) -> TransactionCounts {
        TransactionCounts {
            begun: self.begun.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionCounts {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

/// Scoped session transaction; rolls back on drop unless committed.
///
/// If the session already has an open transaction the guard joins it and
/// leaves commit and rollback to the guard that opened it.
#[must_use = "dropping the guard rolls the transaction back"]
pub struct TransactionGuard<'s> {
    session: &'s Session,
    stats: &'s TransactionStats,
    owner: bool,
    finished: bool,
}

impl<'s> TransactionGuard<'s> {
    pub fn begin(session: &'s Session, stats: &'s TransactionStats) -> Self {
        let owner = session.begin_transaction();
        if owner {
            stats.begun.fetch_add(1, Ordering::Relaxed);
            debug!("transaction begun");
        } else {
            debug!("joining open transaction");
        }
        Self {
            session,
            stats,
            owner,
            finished: false,
        }
    }

    pub async fn commit(mut self, ct: &CancellationToken) -> MediatorResult<()> {
        if !self.owner {
            self.finished = true;
            return Ok(());
        }

        let result = self.session.commit_transaction(ct).await;
        self.finished = true;
        match &result {
            Ok(()) => {
                self.stats.committed.fetch_add(1, Ordering::Relaxed);
                debug!("transaction committed");
            }
            Err(error) => {
                self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
                warn!(error = %error, "commit failed; transaction rolled back");
            }
        }
        result
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.finished || !self.owner {
            return;
        }
        self.session.rollback_transaction();
        self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
        warn!("transaction rolled back");
    }
}

/// Wraps `next` in a [`TransactionGuard`].
#[derive(Debug, Clone, Default)]
pub struct TransactionBehavior {
    stats: Arc<TransactionStats>,
}

impl TransactionBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters; stays valid after the behavior is registered.
    pub fn stats(&self) -> Arc<TransactionStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl PipelineBehavior<Session> for TransactionBehavior {
    async fn handle(
        &self,
        request: RequestEnvelope,
        session: &Session,
        next: Next<'_, Session>,
        ct: &CancellationToken,
    ) -> MediatorResult<BoxedResponse> {
        let request_type = request.request_type();
        let request_id = request.request_id();

        let guard = TransactionGuard::begin(session, &self.stats);
        let response = next.run(request, ct).await?;
        if ct.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }
        guard.commit(ct).await?;

        debug!(request = request_type, request_id = %request_id, "request committed");
        Ok(response)
    }
}
