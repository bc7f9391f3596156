use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::expiry_monitor::ExpiryMonitor;

/// Point-in-time copy of every cached value, keyed by canonical sensor key.
pub type Snapshot = HashMap<String, String>;

/// Latest value received for one canonical sensor key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub key: String,
    pub value: String,
    /// Wall-clock time of the last write.
    pub recorded_at: DateTime<Utc>,
}

/// In-memory store of the most recent `Reading` per sensor key, with a
/// fixed lifetime after which entries are swept away.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Uses a `tokio::sync::RwLock` so snapshots never observe a half-applied write.
#[derive(Clone)]
pub struct ExpiringCache {
    inner: Arc<Inner>,
}

struct Inner {
    entries: RwLock<HashMap<String, Reading>>,
    lifetime: Duration,
    monitoring: CancellationToken,
}

impl ExpiringCache {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                lifetime,
                monitoring: CancellationToken::new(),
            }),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.inner.lifetime
    }

    /// Overwrite the cached value for `key`, stamping it with the current time.
    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.insert_at(key.into(), value.into(), Utc::now()).await;
    }

    pub(crate) async fn insert_at(&self, key: String, value: String, recorded_at: DateTime<Utc>) {
        let reading = Reading {
            key: key.clone(),
            value,
            recorded_at,
        };
        self.inner.entries.write().await.insert(key, reading);
    }

    /// Return a snapshot of every value currently in the cache.
    pub async fn values(&self) -> Snapshot {
        self.inner
            .entries
            .read()
            .await
            .values()
            .map(|r| (r.key.clone(), r.value.clone()))
            .collect()
    }

    /// Return the full reading for `key`, if present.
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<Reading> {
        self.inner.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    #[allow(dead_code)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every entry older than `lifetime` and return how many went.
    ///
    /// Does nothing once monitoring has been stopped.
    pub async fn sweep(&self, lifetime: Duration) -> usize {
        self.sweep_at(lifetime, Utc::now()).await
    }

    /// Inner implementation that takes an explicit `now` so tests can
    /// place the sweep at an exact offset from the insert.
    pub(crate) async fn sweep_at(&self, lifetime: Duration, now: DateTime<Utc>) -> usize {
        if self.inner.monitoring.is_cancelled() {
            return 0;
        }

        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|_, r| !is_expired(r.recorded_at, now, lifetime));
        before - entries.len()
    }

    /// Spawn an `ExpiryMonitor` that sweeps with this cache's lifetime
    /// every `check_interval`.
    pub fn monitor_expiry(&self, check_interval: Duration) -> JoinHandle<()> {
        tokio::spawn(ExpiryMonitor::new(self.clone(), check_interval).run())
    }

    /// Stop the background monitor. Safe to call more than once.
    pub fn stop_monitoring(&self) {
        self.inner.monitoring.cancel();
    }

    pub(crate) fn monitoring_token(&self) -> CancellationToken {
        self.inner.monitoring.clone()
    }
}

/// Timestamps in the future (clock moved backwards) count as age zero.
fn is_expired(recorded_at: DateTime<Utc>, now: DateTime<Utc>, lifetime: Duration) -> bool {
    let age = now
        .signed_duration_since(recorded_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    age > lifetime
}
