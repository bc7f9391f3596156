pub mod service;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use rumqttc::QoS;

pub use service::SensorService;

/// One message received from the subscription source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text; invalid UTF-8 sequences are replaced.
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSubscription {
    pub topic: String,
    pub qos: QoS,
}

/// Source of inbound sensor messages.
///
/// The returned stream ends when the underlying connection closes.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn subscribe(
        &self,
        subscriptions: Vec<TopicSubscription>,
    ) -> Result<BoxStream<'static, InboundMessage>>;
}
