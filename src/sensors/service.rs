use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use rumqttc::QoS;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::{InboundMessage, SubscriptionSource, TopicSubscription};
use crate::{address_map::AddressMap, reading_cache::ExpiringCache};

/// Feeds readings from the subscription source into the cache.
pub struct SensorService {
    cache: ExpiringCache,
    address_map: Arc<AddressMap>,
}

impl SensorService {
    pub fn new(cache: ExpiringCache, address_map: Arc<AddressMap>) -> Self {
        Self { cache, address_map }
    }

    /// Subscribes to every mapped topic and caches readings until the
    /// message stream ends or `stop` is cancelled.
    ///
    /// Whatever the exit path, expiry monitoring is stopped and `shutdown`
    /// is cancelled before returning. This is the only place that cancels
    /// `shutdown`.
    pub async fn run(
        self,
        source: &dyn SubscriptionSource,
        stop: CancellationToken,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let result = self.ingest(source, &stop).await;

        if let Err(e) = &result {
            error!(error = %e, "Sensor ingestion failed");
        }
        self.cache.stop_monitoring();
        shutdown.cancel();

        result
    }

    async fn ingest(&self, source: &dyn SubscriptionSource, stop: &CancellationToken) -> Result<()> {
        let subscriptions: Vec<TopicSubscription> = self
            .address_map
            .topics()
            .map(|topic| TopicSubscription {
                topic: topic.to_owned(),
                qos: QoS::AtMostOnce,
            })
            .collect();
        let topic_count = subscriptions.len();

        // A broker that accepts the connection but never acknowledges it
        // must not hold up a requested stop.
        let mut messages = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                info!("Stop requested before subscription completed");
                return Ok(());
            }
            subscribed = source.subscribe(subscriptions) => subscribed?,
        };
        info!(topics = topic_count, "Sensor ingestion started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("Stop requested; ending sensor ingestion");
                    break;
                }
                next = messages.next() => match next {
                    Some(message) => self.handle(message).await,
                    None => {
                        info!("Subscription closed; ending sensor ingestion");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    async fn handle(&self, message: InboundMessage) {
        let Some(key) = self.address_map.key_for(&message.topic) else {
            debug!(topic = %message.topic, "Message on unmapped topic; dropping");
            return;
        };

        let value = message.payload_str();
        trace!(key, topic = %message.topic, value = %value, "Caching reading");
        self.cache.insert(key, value).await;
    }
}
