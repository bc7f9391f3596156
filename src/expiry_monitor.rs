use std::time::Duration;

use tokio::time;
use tracing::{debug, info};

use crate::reading_cache::ExpiringCache;

/// Background task that periodically removes expired readings from an
/// `ExpiringCache`.
pub struct ExpiryMonitor {
    cache: ExpiringCache,
    interval: Duration,
}

impl ExpiryMonitor {
    pub fn new(cache: ExpiringCache, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Sweeps every `interval` until `ExpiringCache::stop_monitoring` is called.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        let lifetime = self.cache.lifetime();
        let stopped = self.cache.monitoring_token();
        info!(
            interval_ms = self.interval.as_millis() as u64,
            lifetime_ms = lifetime.as_millis() as u64,
            "Expiry monitor started"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stopped.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = self.cache.sweep(lifetime).await;
                    if removed > 0 {
                        let remaining = self.cache.len().await;
                        debug!(removed, remaining, "Expired readings swept");
                    }
                }
            }
        }

        info!("Expiry monitor stopped");
    }
}
