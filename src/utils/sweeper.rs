//! Periodic housekeeping task.
//!
//! The cache and the dedup guard each own one [`SweepTask`]. The task runs on
//! the Tokio runtime that was current at construction, ticks on a fixed
//! interval and stops when [`SweepTask::stop`] is awaited. A caller's
//! cancellation never reaches it; only the owner's shutdown does.

use crate::{Error, ErrorContext, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Longest period a sweep waits between runs; longer intervals are clamped.
pub const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(365 * 24 * 3600);

pub struct SweepTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweepTask {
    /// Spawn `sweep` to run every `period`. The first run happens one full
    /// period after spawning.
    pub fn spawn<F>(name: &'static str, period: Duration, mut sweep: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(Error::configuration_with_context(
                "sweep interval must be greater than zero",
                ErrorContext::new().with_source(name),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::configuration_with_context(
                "background sweep requires a running Tokio runtime",
                ErrorContext::new()
                    .with_source(name)
                    .with_details(e.to_string()),
            )
        })?;

        let period = period.min(MAX_SWEEP_PERIOD);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::debug!(task = name, interval_ms = period.as_millis() as u64, "sweep task started");

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // Sender dropped counts as shutdown too.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        sweep();
                    }
                }
            }

            tracing::debug!(task = name, "sweep task stopped");
        });

        Ok(Self {
            name,
            shutdown_tx,
            handle,
        })
    }

    /// Signal shutdown and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            // A panicking sweep must not take the owner's shutdown down with it.
            tracing::warn!(task = self.name, error = %e, "sweep task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
