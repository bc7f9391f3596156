mod address_map;
mod config;
mod expiry_monitor;
mod mqtt;
mod pipeline;
mod reading_cache;
mod report;
mod sensors;
mod wunderground;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{
    address_map::AddressMap,
    config::Config,
    mqtt::MqttSource,
    pipeline::Pipeline,
    reading_cache::ExpiringCache,
    wunderground::StationClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    let sensor_map = config::read_sensor_map(&config.sensor_map_path).await?;
    let address_map = AddressMap::new(sensor_map).context("invalid sensor map")?;
    info!(sensors = address_map.len(), path = %config.sensor_map_path.display(), "Sensor map loaded");

    let source = MqttSource::new(&config.mqtt_broker)?;
    let station = StationClient::new(&config)?;

    let pipeline = Pipeline {
        cache: ExpiringCache::new(config.sensor_lifetime),
        address_map: Arc::new(address_map),
        source,
        reporter: station,
        cache_check_interval: config.cache_check_interval,
        report_period: config.report_period,
    };

    // Ctrl+C / SIGTERM end ingestion, which then shuts the rest down.
    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            stop.cancel();
        });
    }

    pipeline.run(stop).await?;

    info!("pws_aggregator exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
