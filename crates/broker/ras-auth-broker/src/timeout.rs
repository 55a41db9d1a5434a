//! One-shot per-attempt timers

use ras_auth_broker_core::CorrelationToken;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Schedules one-shot expiry callbacks on the tokio runtime
///
/// A scheduled timer always fires; there is no per-timer cancel. The expiry
/// handler decides whether the firing still matters. Only [`TimeoutScheduler::shutdown`]
/// stops timers, and it stops all of them.
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Invoke `on_expire(token)` once, on its own task, after `duration`
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, token: CorrelationToken, duration: Duration, on_expire: F)
    where
        F: FnOnce(CorrelationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    on_expire(token).await;
                }
                _ = shutdown.cancelled() => {
                    debug!("Timer for {} cancelled by shutdown", token);
                }
            }
        });
    }

    /// Number of timers that have not finished yet
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every outstanding timer and wait for their tasks to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
