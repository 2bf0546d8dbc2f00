//! Periodic removal of expired codes and tokens.
//!
//! Sweeping only reclaims memory. Correctness never depends on it because the
//! store read paths re-check expiry.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::OAuth2Service;

/// Default sweep interval.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background sweeper with idempotent start/stop.
pub struct CleanupScheduler {
    service: Arc<OAuth2Service>,
    interval: Duration,
    // Guards only the task handle; the sweep itself never takes this lock.
    running: Mutex<Option<Running>>,
}

impl CleanupScheduler {
    /// Create a stopped scheduler.
    #[must_use]
    pub fn new(service: Arc<OAuth2Service>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Sweep interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the sweep task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the sweep task. No-op if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("Cleanup scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(
            Arc::clone(&self.service),
            self.interval,
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        info!(interval = ?self.interval, "Cleanup scheduler started");
    }

    /// Cancel the sweep task and wait for it to finish. No-op if not running.
    pub async fn stop(&self) {
        // Take the handle out before awaiting so the lock is never held
        // across the join.
        let Some(Running { cancel, handle }) = self.running.lock().take() else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Cleanup task ended abnormally");
        }
        info!("Cleanup scheduler stopped");
    }
}

async fn sweep_loop(service: Arc<OAuth2Service>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; skip it so the first sweep runs
    // one interval after start.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Cleanup task shutting down");
                break;
            }
            _ = ticker.tick() => {
                // A sweep in progress runs to completion; cancellation is only
                // observed between iterations.
                match service.sweep_expired(SystemTime::now()).await {
                    Ok(report) if report.total() > 0 => debug!(
                        codes = report.codes,
                        access_tokens = report.access_tokens,
                        refresh_tokens = report.refresh_tokens,
                        "Swept expired OAuth records"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Sweep of expired OAuth records failed"),
                }
            }
        }
    }
}
