//! Periodic cleanup of expired shield and cache state.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::lifecycle::ticker::{delayed_interval, retune};
use crate::runtime::{EdgeRuntime, SharedRuntime};

pub struct Sweeper {
    runtime: SharedRuntime,
}

impl Sweeper {
    pub fn new(runtime: SharedRuntime) -> Self {
        Self { runtime }
    }

    /// Sweep until shutdown. The period follows `shield.cleanup_interval_secs`
    /// of the current runtime, re-read after every pass.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.runtime.load().config.shield.cleanup_interval_secs);
        tracing::info!(interval_secs = interval.as_secs(), "Sweeper starting");

        let mut ticker = delayed_interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let runtime = self.runtime.load_full();
                    sweep(&runtime, Instant::now());
                    let wanted = Duration::from_secs(runtime.config.shield.cleanup_interval_secs);
                    retune(&mut ticker, wanted, "sweeper");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// One cleanup pass over the given runtime.
pub fn sweep(runtime: &EdgeRuntime, now: Instant) {
    runtime.gate.cleanup_at(now);
    let expired = runtime.pipeline.cache().purge_expired_at(now);
    if expired > 0 {
        tracing::debug!(expired, "Expired cache entries purged");
    }
}
