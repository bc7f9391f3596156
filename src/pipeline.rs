//! Wires the cache, expiry monitor, ingestion loop and report loop together
//! and waits for them to wind down.
//!
//! Shutdown is driven from one place: when ingestion ends (stream closed,
//! subscribe failure, or `stop` cancelled) it stops expiry monitoring and
//! cancels the shared shutdown token, which the report loop observes.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    address_map::AddressMap,
    reading_cache::ExpiringCache,
    report::{ReportService, Reporter},
    sensors::{SensorService, SubscriptionSource},
};

pub struct Pipeline<S, R> {
    pub cache: ExpiringCache,
    pub address_map: Arc<AddressMap>,
    pub source: S,
    pub reporter: R,
    pub cache_check_interval: Duration,
    pub report_period: Duration,
}

impl<S, R> Pipeline<S, R>
where
    S: SubscriptionSource + 'static,
    R: Reporter + 'static,
{
    /// Run until ingestion ends and the report loop has observed shutdown.
    ///
    /// Returns the ingestion error, if any, or an error if either task panicked.
    pub async fn run(self, stop: CancellationToken) -> Result<()> {
        let Self {
            cache,
            address_map,
            source,
            reporter,
            cache_check_interval,
            report_period,
        } = self;
        let shutdown = CancellationToken::new();

        let monitor = cache.monitor_expiry(cache_check_interval);

        let mut tasks = JoinSet::new();
        {
            let sensors = SensorService::new(cache.clone(), address_map);
            let shutdown = shutdown.clone();
            tasks.spawn(async move { sensors.run(&source, stop, shutdown).await });
        }
        {
            let report = ReportService::new(reporter, cache.clone(), report_period);
            tasks.spawn(async move {
                report.run(shutdown).await;
                Ok(())
            });
        }

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| anyhow!("pipeline task panicked: {e}")).and_then(|r| r);
            if let Err(e) = result {
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        // Normally already stopped by ingestion; a panicked ingestion task
        // would leave the monitor running.
        cache.stop_monitoring();
        if let Err(e) = monitor.await {
            error!(error = %e, "Expiry monitor panicked");
        }

        info!("Pipeline stopped");
        outcome
    }
}
