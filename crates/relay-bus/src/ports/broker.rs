//! Outbound (Driven) port to the message broker.
//!
//! The broker owns transport and storage; the bus only provisions and drives
//! it through this trait. Every component receives its broker handle
//! explicitly at construction.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{MessageId, QueueHandle, Receipt, ResourceId, SubscriptionHandle, TopicHandle};
use crate::error::BrokerError;

/// Parameters of a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Upper bound on messages returned by one call.
    pub max_messages: u8,

    /// How long delivered messages stay hidden from other consumers.
    pub visibility_timeout: Duration,

    /// Long-poll window: how long the call may wait for a message.
    pub wait_time: Duration,
}

/// One message instance handed out by a receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt: Receipt,
    /// Raw queue body, i.e. the serialized delivery wrapper.
    pub body: String,
}

/// Topic/queue broker operations.
///
/// Create operations are create-or-get: calling them again with the same
/// name returns a handle to the existing resource.
#[async_trait]
pub trait BrokerProvider: Send + Sync {
    /// Create or look up a topic by name.
    async fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError>;

    /// Create or look up a queue by name.
    async fn create_queue(&self, name: &str) -> Result<QueueHandle, BrokerError>;

    /// Resolve the queue's resource identifier (its ARN).
    async fn queue_resource_id(&self, queue: &QueueHandle) -> Result<ResourceId, BrokerError>;

    /// Register delivery from `topic` into the queue identified by `endpoint`.
    async fn subscribe(
        &self,
        topic: &TopicHandle,
        endpoint: &ResourceId,
    ) -> Result<SubscriptionHandle, BrokerError>;

    /// Replace the queue's access policy with `policy` (JSON).
    async fn set_queue_policy(&self, queue: &QueueHandle, policy: &str) -> Result<(), BrokerError>;

    /// Publish one message body to a topic.
    async fn publish(&self, topic: &TopicHandle, body: &str) -> Result<MessageId, BrokerError>;

    /// Receive up to `request.max_messages`, waiting at most `request.wait_time`.
    ///
    /// An empty vector means the wait window elapsed with nothing visible.
    async fn receive(
        &self,
        queue: &QueueHandle,
        request: ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, BrokerError>;

    /// Acknowledge and permanently remove one delivered message instance.
    async fn delete_message(&self, queue: &QueueHandle, receipt: &Receipt) -> Result<(), BrokerError>;
}
