//! Cross-instance bridge.
//!
//! Frames for recipients that are not connected to this instance are
//! published on a shared topic. Every instance subscribes to the topic and
//! hands events to its local registry; events this instance published itself
//! are ignored.

pub mod inmemory;
pub mod redis;

use std::{sync::Arc, time::Duration};

use futures_util::{StreamExt, future::join_all};
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;

pub use self::inmemory::InMemoryEventBus;
pub use self::redis::RedisEventBus;

use crate::{
    domain::{BusError, EventBus, InstanceId, UserId},
    infrastructure::{
        dto::bridge::BridgeEvent,
        registry::{ConnectionRegistry, Delivery, Frame},
    },
};

/// Default topic shared by all instances
pub const DEFAULT_TOPIC: &str = "dengon:fanout";

/// Upper bound on one bus publish; a hung broker must not stall fanout
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Publishes fanout for remote recipients and relays remote fanout locally
pub struct Bridge {
    instance_id: InstanceId,
    topic: String,
    bus: Arc<dyn EventBus>,
    registry: Arc<ConnectionRegistry>,
    publish_timeout: Duration,
}

impl Bridge {
    pub fn new(
        instance_id: InstanceId,
        topic: impl Into<String>,
        bus: Arc<dyn EventBus>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            instance_id,
            topic: topic.into(),
            bus,
            registry,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `frame` for `target` on the shared topic.
    ///
    /// Failures and timeouts are logged and swallowed: remote delivery is
    /// best effort.
    ///
    /// # Returns
    ///
    /// `true` if the event reached the bus
    pub async fn publish(&self, target: UserId, frame: &str) -> bool {
        let event = BridgeEvent {
            origin: self.instance_id,
            target,
            frame: frame.to_string(),
        };
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(user_id = %target, "Failed to encode bridge event: {}", e);
                return false;
            }
        };

        match timeout(self.publish_timeout, self.bus.publish(&self.topic, payload)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(user_id = %target, "Bridge publish failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %target,
                    timeout_ms = self.publish_timeout.as_millis() as u64,
                    "Bridge publish timed out"
                );
                false
            }
        }
    }

    /// Publish `frame` for every target concurrently.
    ///
    /// Takes at most one publish timeout regardless of the number of targets.
    ///
    /// # Returns
    ///
    /// The number of events that reached the bus
    pub async fn publish_all(&self, targets: &[UserId], frame: &str) -> usize {
        join_all(targets.iter().map(|&target| self.publish(target, frame)))
            .await
            .into_iter()
            .filter(|published| *published)
            .count()
    }

    /// Subscribe to the shared topic and relay events until `shutdown` fires.
    ///
    /// The subscription is established before this returns, so events
    /// published afterwards are not missed. If the stream ends, the instance
    /// keeps serving its local sessions only.
    pub async fn spawn_subscriber(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, BusError> {
        let mut stream = self.bus.subscribe(&self.topic).await?;
        tracing::info!(topic = %self.topic, instance_id = %self.instance_id, "Bridge subscribed");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = stream.next() => match next {
                        Some(payload) => {
                            self.relay(&payload).await;
                        }
                        None => {
                            tracing::error!(
                                topic = %self.topic,
                                "Bridge subscription ended; continuing with local delivery only"
                            );
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Bridge subscriber stopped");
        }))
    }

    /// Deliver one bus payload to the local registry.
    ///
    /// # Returns
    ///
    /// `None` for malformed payloads and our own echoes
    async fn relay(&self, payload: &str) -> Option<Delivery> {
        let event = match BridgeEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Ignoring malformed bridge payload: {}", e);
                return None;
            }
        };
        if event.origin == self.instance_id {
            return None;
        }

        let frame: Frame = Arc::from(event.frame);
        let delivery = self.registry.deliver(event.target, frame).await;
        if delivery == Delivery::Delivered {
            tracing::debug!(user_id = %event.target, origin = %event.origin, "Relayed remote frame");
        }
        Some(delivery)
    }
}
