//! Recurring background job.
//!
//! Sends one request per iteration, each in a fresh [`Session`](crate::Session) so no
//! tracked state or transaction survives from one iteration to the next.
//! The loop stops when its stop token fires; an in-flight request sees the
//! same token and is cancelled with it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mediary_events::Request;

use crate::session::SessionFactory;

/// Recurring job configuration.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Name for logging
    pub name: String,
    /// Wait between iterations; zero starts the next one right away
    pub pause: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: "recurring-job".to_string(),
            pause: Duration::ZERO,
        }
    }
}

impl JobConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// Job runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub iterations: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Sends the request built by `make_request` until stopped.
///
/// A failed iteration is logged and counted; the loop carries on.
pub struct RecurringJob<F> {
    sessions: SessionFactory,
    make_request: F,
    config: JobConfig,
    stats: Arc<Mutex<JobStats>>,
}

impl<F, R> RecurringJob<F>
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Request,
{
    pub fn new(sessions: SessionFactory, config: JobConfig, make_request: F) -> Self {
        Self {
            sessions,
            make_request,
            config,
            stats: Arc::default(),
        }
    }

    /// Run on the current task until `stop` fires.
    pub async fn run(self, stop: CancellationToken) -> JobStats {
        let name = self.config.name.as_str();
        info!(job = %name, "job started");

        while !stop.is_cancelled() {
            let session = self.sessions.open();
            let result = session.send((self.make_request)(), &stop).await;

            match result {
                Err(err) if err.is_cancelled() => {
                    debug!(job = %name, "iteration cancelled");
                    break;
                }
                Ok(_) => {
                    let iteration = self.record(true);
                    debug!(job = %name, iteration, "iteration completed");
                }
                Err(err) => {
                    let iteration = self.record(false);
                    warn!(job = %name, iteration, error = %err, "iteration failed");
                }
            }

            if !self.pause(&stop).await {
                break;
            }
        }

        info!(job = %name, "job stopped");
        self.snapshot()
    }

    /// Run on a spawned task; stop it through the returned handle.
    pub fn spawn(self) -> JobHandle {
        let stop = CancellationToken::new();
        let stats = Arc::clone(&self.stats);
        let join = tokio::spawn(self.run(stop.clone()));
        JobHandle { stop, join, stats }
    }

    fn record(&self, succeeded: bool) -> u64 {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.iterations += 1;
        if succeeded {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
        stats.iterations
    }

    fn snapshot(&self) -> JobStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `false` if `stop` fired while waiting.
    async fn pause(&self, stop: &CancellationToken) -> bool {
        if self.config.pause.is_zero() {
            // Requests that never suspend would otherwise starve the runtime.
            tokio::task::yield_now().await;
            return !stop.is_cancelled();
        }
        tokio::select! {
            _ = stop.cancelled() => false,
            _ = tokio::time::sleep(self.config.pause) => true,
        }
    }
}

/// Handle to a spawned [`RecurringJob`].
#[derive(Debug)]
pub struct JobHandle {
    stop: CancellationToken,
    join: JoinHandle<JobStats>,
    stats: Arc<Mutex<JobStats>>,
}

impl JobHandle {
    pub fn stats(&self) -> JobStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fire the stop token and wait for the loop to finish.
    pub async fn shutdown(self) -> Result<JobStats, JoinError> {
        self.stop.cancel();
        self.join.await
    }
}

