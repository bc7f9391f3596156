pub mod service;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use thiserror::Error;

use crate::reading_cache::Snapshot;

pub use service::ReportService;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no readings to report")]
    NoReadings,
    #[error("station update request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("station rejected update: {0}")]
    Rejected(String),
}

/// Remote endpoint that receives periodic snapshots of the cache.
#[async_trait]
pub trait Reporter: Send {
    /// Replace the observation that the next `push` will send.
    fn update(&mut self, snapshot: Snapshot);

    /// Submit the current observation.
    async fn push(&mut self) -> Result<(), ReportError>;
}
