//! Redis pub/sub event bus.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};

use crate::domain::{BusError, BusStream, EventBus};

/// [`EventBus`] backed by Redis PUBLISH/SUBSCRIBE
///
/// Publishing shares one multiplexed connection; each subscription opens its
/// own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisEventBus {
    client: Client,
    publisher: MultiplexedConnection,
}

impl RedisEventBus {
    /// Connect to the broker at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = Client::open(url).map_err(unavailable)?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        tracing::info!("Connected to Redis event bus");
        Ok(Self { client, publisher })
    }
}

fn unavailable(err: redis::RedisError) -> BusError {
    BusError::Unavailable(err.to_string())
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut connection = self.publisher.clone();
        let _receivers: i64 = connection
            .publish(topic, payload)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(unavailable)?;
        pubsub.subscribe(topic).await.map_err(unavailable)?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|message| async move {
                match message.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!("Dropping non-UTF-8 bus payload: {}", e);
                        None
                    }
                }
            });

        Ok(stream.boxed())
    }
}
