use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, SubscribeFilter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sensors::{InboundMessage, SubscriptionSource, TopicSubscription};

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 100;

/// Subscription source backed by an MQTT broker.
///
/// Each `subscribe` call opens its own connection. The returned stream ends
/// on the first connection error; reconnecting is left to whoever restarts
/// the process.
#[derive(Debug, Clone)]
pub struct MqttSource {
    host: String,
    port: u16,
}

impl MqttSource {
    /// `broker` is `host:port`, `host`, or `:port`; the host defaults to
    /// `localhost` and the port to 1883.
    pub fn new(broker: &str) -> Result<Self> {
        let (host, port) = parse_broker_address(broker)?;
        Ok(Self { host, port })
    }
}

#[async_trait]
impl SubscriptionSource for MqttSource {
    async fn subscribe(
        &self,
        subscriptions: Vec<TopicSubscription>,
    ) -> Result<BoxStream<'static, InboundMessage>> {
        let client_id = format!("pws-aggregator-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(&client_id, &self.host, self.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let filters: Vec<SubscribeFilter> = subscriptions
            .into_iter()
            .map(|s| SubscribeFilter::new(s.topic, s.qos))
            .collect();
        let topics = filters.len();
        // Queued now, sent by the event loop once connected.
        client
            .subscribe_many(filters)
            .await
            .context("Failed to queue MQTT subscriptions")?;

        wait_for_connack(&mut eventloop)
            .await
            .with_context(|| format!("Failed to connect to MQTT broker {}:{}", self.host, self.port))?;
        info!(host = %self.host, port = self.port, client_id = %client_id, topics, "Connected to MQTT broker");

        Ok(publishes(client, eventloop))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

/// Drive the event loop, yielding incoming publishes until the connection
/// fails. The client rides along in the state so the request channel stays open.
fn publishes(client: AsyncClient, eventloop: EventLoop) -> BoxStream<'static, InboundMessage> {
    futures::stream::unfold((client, eventloop), |(client, mut eventloop)| async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                    return Some((message, (client, eventloop)));
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    debug!(pkid = suback.pkid, "MQTT subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection closed");
                    return None;
                }
            }
        }
    })
    .boxed()
}

fn parse_broker_address(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    let addr = addr
        .strip_prefix("mqtt://")
        .or_else(|| addr.strip_prefix("tcp://"))
        .unwrap_or(addr);

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port in MQTT broker address {addr:?}"))?;
            (host, port)
        }
        None => (addr, DEFAULT_PORT),
    };

    anyhow::ensure!(!host.contains(':'), "invalid MQTT broker address {addr:?}");
    let host = if host.is_empty() { "localhost" } else { host };
    Ok((host.to_owned(), port))
}
