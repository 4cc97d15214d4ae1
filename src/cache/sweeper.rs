//! Background expiry sweeper.
//!
//! One long-lived task per facade physically deletes rows whose TTL has
//! elapsed. Correctness never depends on it — reads already treat expired
//! rows as absent — but without it stale rows accumulate indefinitely.
//!
//! Lifecycle: start is idempotent (no duplicate task while one is live);
//! stop is cooperative, a watch signal raced against the task's sleeps,
//! with the join bounded by a timeout.

use crate::core::config::SweeperConfig;
use crate::core::time::Clock;
use crate::store::RecordStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to the background sweep task.
#[derive(Debug)]
pub struct Sweeper {
    config: SweeperConfig,
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    running: Arc<AtomicBool>,
}

impl Sweeper {
    /// Create a stopped sweeper.
    pub fn new(config: SweeperConfig) -> Self {
        Self {
            config,
            handle: None,
            shutdown_tx: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the sweep task is currently alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bound on waiting for the task to observe a stop request.
    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.config.stop_join_timeout_ms)
    }

    /// Spawn the sweep task if none is live.
    pub fn start(&mut self, store: RecordStore, clock: Arc<dyn Clock>) {
        if self.is_running() {
            tracing::debug!("expiry sweeper already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let grace = Duration::from_millis(self.config.grace_period_ms);
        let interval = Duration::from_millis(self.config.interval_ms);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                _ = wait_for_stop(&mut shutdown_rx) => {
                    running.store(false, Ordering::Release);
                    tracing::info!("expiry sweeper stopped before first sweep");
                    return;
                }
            }

            loop {
                match store.delete_expired(clock.now()).await {
                    Ok(0) => tracing::debug!("sweep found no expired entries"),
                    Ok(removed) => tracing::debug!(removed, "sweep removed expired entries"),
                    Err(error) => {
                        // A failed iteration must not kill the loop.
                        tracing::warn!(error = %error, "sweep iteration failed");
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = wait_for_stop(&mut shutdown_rx) => break,
                }
            }

            running.store(false, Ordering::Release);
            tracing::info!("expiry sweeper stopped");
        });

        self.handle = Some(handle);
        self.shutdown_tx = Some(shutdown_tx);
        tracing::info!(
            grace_period_ms = self.config.grace_period_ms,
            interval_ms = self.config.interval_ms,
            "expiry sweeper started"
        );
    }

    /// Signal the task to stop and hand back its join handle.
    ///
    /// The caller decides whether (and how long) to wait; without a wait
    /// the task drains on its own and clears the running flag when it
    /// observes the signal.
    pub fn signal_stop(&mut self) -> Option<JoinHandle<()>> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.handle.take()
    }
}

/// Resolve once the shutdown signal flips to true.
async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Run a single sweep pass, returning the number of rows removed.
///
/// Storage errors are logged and reported as zero removals; a sweep is
/// housekeeping and must never fail its caller.
pub async fn sweep_once(store: &RecordStore, clock: &dyn Clock) -> u64 {
    match store.delete_expired(clock.now()).await {
        Ok(removed) => removed,
        Err(error) => {
            tracing::warn!(error = %error, "manual sweep failed");
            0
        }
    }
}
