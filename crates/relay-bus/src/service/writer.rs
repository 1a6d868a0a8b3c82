//! # Writer
//!
//! Publishes events to one topic. Each `write` is a single broker call; the
//! caller decides whether to retry.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{Event, TopicHandle};
use crate::error::{ProvisioningError, WriteError};
use crate::ports::BrokerProvider;
use crate::service::provisioner::Provisioner;

/// Producer bound to a single topic.
#[derive(Clone)]
pub struct Writer {
    broker: Arc<dyn BrokerProvider>,
    topic: TopicHandle,
}

impl Writer {
    /// Ensure the topic exists and bind a writer to it.
    pub async fn new(
        broker: Arc<dyn BrokerProvider>,
        topic_name: &str,
    ) -> Result<Self, ProvisioningError> {
        let topic = Provisioner::new(Arc::clone(&broker))
            .ensure_topic(topic_name)
            .await?;
        Ok(Self { broker, topic })
    }

    /// Bind to an already provisioned topic.
    pub fn with_topic(broker: Arc<dyn BrokerProvider>, topic: TopicHandle) -> Self {
        Self { broker, topic }
    }

    pub fn topic(&self) -> &TopicHandle {
        &self.topic
    }

    /// Serialize `event` and publish it.
    pub async fn write(&self, event: &Event) -> Result<(), WriteError> {
        let body = event.to_json().map_err(|source| WriteError::Serialization {
            event_id: event.id().to_string(),
            source,
        })?;

        let message_id = self
            .broker
            .publish(&self.topic, &body)
            .await
            .map_err(|source| WriteError::Transport {
                topic: self.topic.name().to_string(),
                source,
            })?;

        debug!(
            topic = %self.topic.resource_id(),
            event_id = %event.id(),
            event_type = %event.event_type(),
            message_id = %message_id,
            "Event published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{BrokerOperation, InMemoryBroker};
    use crate::error::BrokerError;

    #[tokio::test]
    async fn test_new_creates_topic_once() {
        let broker = Arc::new(InMemoryBroker::new());
        let first = Writer::new(broker.clone(), "orders").await.unwrap();
        let second = Writer::new(broker.clone(), "orders").await.unwrap();

        assert_eq!(first.topic(), second.topic());
        assert_eq!(broker.topic_count(), 1);
    }

    #[tokio::test]
    async fn test_write_without_subscribers_succeeds() {
        let broker = Arc::new(InMemoryBroker::new());
        let writer = Writer::new(broker.clone(), "orders").await.unwrap();

        writer.write(&Event::builder("order.created", "A").build()).await.unwrap();
        assert_eq!(broker.published_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let broker = Arc::new(InMemoryBroker::new());
        let writer = Writer::new(broker.clone(), "orders").await.unwrap();
        broker.fail_next(BrokerOperation::Publish, 1);

        let err = writer
            .write(&Event::builder("order.created", "A").build())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::Transport { ref topic, source: BrokerError::Unavailable(_) } if topic == "orders"
        ));
        assert_eq!(broker.published_count(), 0);
    }

    #[tokio::test]
    async fn test_new_surfaces_provisioning_failure() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next(BrokerOperation::CreateTopic, 1);
        assert!(Writer::new(broker, "orders").await.is_err());
    }
}
