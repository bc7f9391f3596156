use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{ReportError, Reporter};
use crate::reading_cache::ExpiringCache;

pub struct ReportService<R> {
    reporter: R,
    cache: ExpiringCache,
    period: Duration,
}

impl<R: Reporter> ReportService<R> {
    pub fn new(reporter: R, cache: ExpiringCache, period: Duration) -> Self {
        Self {
            reporter,
            cache,
            period,
        }
    }

    /// Pushes a cache snapshot every `period` until `shutdown` is cancelled.
    /// Spawn this via `tokio::spawn`.
    ///
    /// The first report goes out one full period after start. A pending
    /// shutdown takes precedence over a due tick.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(period_ms = self.period.as_millis() as u64, "Report loop started");
        let mut ticker = time::interval_at(time::Instant::now() + self.period, self.period);
        // A push that overruns the period must not be followed by a burst
        // of catch-up pushes.
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Station update failed");
                    }
                }
            }
        }

        info!("Report loop stopped");
    }

    async fn run_once(&mut self) -> Result<(), ReportError> {
        let snapshot = self.cache.values().await;
        let readings = snapshot.len();

        self.reporter.update(snapshot);
        self.reporter.push().await?;

        debug!(readings, "Station updated");
        Ok(())
    }
}
