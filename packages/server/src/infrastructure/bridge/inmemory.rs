//! In-process event bus.
//!
//! Stands in for the shared broker when every instance lives in one process
//! (single-node deployments and integration tests).

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::{BusError, BusStream, EventBus};

/// Default number of undelivered payloads a slow subscriber may lag behind
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast-channel backed [`EventBus`]
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<(String, String)>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        // no subscribers is not an error for a broadcast bus
        let _ = self.sender.send((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let topic = topic.to_string();
        let receiver = self.sender.subscribe();

        let stream = stream::unfold(receiver, move |mut receiver| {
            let topic = topic.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok((published_on, payload)) if published_on == topic => {
                            return Some((payload, receiver));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "In-memory bus subscriber lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_payloads() {
        // テスト項目: 購読者は同じトピックに発行されたペイロードを順に受け取る
        // given (前提条件):
        let bus = InMemoryEventBus::default();
        let mut stream = bus.subscribe("fanout").await.unwrap();

        // when (操作):
        bus.publish("fanout", "one".to_string()).await.unwrap();
        bus.publish("fanout", "two".to_string()).await.unwrap();

        // then (期待する結果):
        assert_eq!(stream.next().await.as_deref(), Some("one"));
        assert_eq!(stream.next().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_other_topics_are_filtered_out() {
        // テスト項目: 別トピックへの発行は購読者に届かない
        // given (前提条件):
        let bus = InMemoryEventBus::default();
        let mut stream = bus.subscribe("fanout").await.unwrap();

        // when (操作):
        bus.publish("other", "ignored".to_string()).await.unwrap();
        bus.publish("fanout", "kept".to_string()).await.unwrap();

        // then (期待する結果):
        assert_eq!(stream.next().await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        // テスト項目: 購読者がいなくても発行はエラーにならない
        // given (前提条件):
        let bus = InMemoryEventBus::default();

        // when (操作):
        let result = bus.publish("fanout", "nobody".to_string()).await;

        // then (期待する結果):
        assert!(result.is_ok());
    }
}
