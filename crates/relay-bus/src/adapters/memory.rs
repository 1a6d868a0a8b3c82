//! # In-Memory Broker
//!
//! A single-process [`BrokerProvider`] with the same observable contract as
//! a topic/queue service:
//!
//! - topics and queues are create-or-get by name
//! - publishing wraps the body in a [`DeliveryWrapper`] and fans it out to
//!   every subscribed queue whose access policy admits the topic
//! - receives long-poll up to the wait window and hide delivered messages for
//!   the visibility timeout; an unacknowledged message reappears with a new
//!   receipt
//! - a receipt is valid only until it is committed, its visibility window
//!   elapses, or the message is redelivered
//!
//! Time is measured with `tokio::time::Instant`, so paused-clock tests can
//! drive visibility expiry deterministically. Fault injection
//! ([`InMemoryBroker::fail_next`], [`InMemoryBroker::inject_raw`]) lets tests
//! exercise transport and decode failures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    DeliveryWrapper, MessageId, PolicyDocument, QueueHandle, Receipt, ResourceId,
    SubscriptionHandle, TopicHandle,
};
use crate::error::BrokerError;
use crate::ports::{BrokerProvider, ReceiveRequest, ReceivedMessage};

/// Maximum length of a topic or queue name.
pub const MAX_NAME_LEN: usize = 80;

const TOPIC_ARN_PREFIX: &str = "arn:memory:sns:local";
const QUEUE_ARN_PREFIX: &str = "arn:memory:sqs:local";
const QUEUE_LOCATOR_PREFIX: &str = "memory://queues";

/// Broker operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOperation {
    CreateTopic,
    CreateQueue,
    QueueResourceId,
    Subscribe,
    SetQueuePolicy,
    Publish,
    Receive,
    DeleteMessage,
}

/// In-process topic/queue broker.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,

    /// Total bodies accepted by `publish`.
    published: AtomicU64,
}

#[derive(Default)]
struct BrokerState {
    /// Topics keyed by resource id.
    topics: HashMap<ResourceId, TopicRecord>,

    /// Queues keyed by locator.
    queues: HashMap<String, QueueRecord>,

    /// Pending injected failures per operation.
    faults: HashMap<BrokerOperation, usize>,
}

struct TopicRecord {
    /// Subscription id -> queue resource id.
    subscriptions: Vec<(SubscriptionHandle, ResourceId)>,
}

struct QueueRecord {
    resource_id: ResourceId,
    policy: Option<PolicyDocument>,
    messages: VecDeque<StoredMessage>,
    notify: Arc<Notify>,
}

struct StoredMessage {
    message_id: MessageId,
    body: String,
    visible_at: Instant,
    /// Receipt of the current delivery, if the message has been received.
    receipt: Option<Receipt>,
    receive_count: u32,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of `operation` fail with
    /// [`BrokerError::Unavailable`].
    pub fn fail_next(&self, operation: BrokerOperation, count: usize) {
        *self.state.lock().faults.entry(operation).or_insert(0) += count;
    }

    /// Enqueue a raw body directly, bypassing topics and policies.
    pub fn inject_raw(
        &self,
        queue: &QueueHandle,
        body: impl Into<String>,
    ) -> Result<MessageId, BrokerError> {
        let mut state = self.state.lock();
        let record = state.queue_mut(queue)?;
        let message_id = MessageId::new(Uuid::new_v4().to_string());
        record.push(message_id.clone(), body.into());
        Ok(message_id)
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.state.lock().topics.len()
    }

    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    /// Number of subscriptions registered on a topic.
    #[must_use]
    pub fn subscription_count(&self, topic: &TopicHandle) -> usize {
        self.state
            .lock()
            .topics
            .get(topic.resource_id())
            .map_or(0, |record| record.subscriptions.len())
    }

    /// Messages stored in a queue, visible or in flight.
    #[must_use]
    pub fn queue_depth(&self, queue: &QueueHandle) -> usize {
        self.state
            .lock()
            .queues
            .get(queue.locator())
            .map_or(0, |record| record.messages.len())
    }

    /// Currently installed access policy of a queue.
    #[must_use]
    pub fn queue_policy(&self, queue: &QueueHandle) -> Option<PolicyDocument> {
        self.state
            .lock()
            .queues
            .get(queue.locator())
            .and_then(|record| record.policy.clone())
    }

    /// Total bodies accepted by `publish`.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl BrokerState {
    fn take_fault(&mut self, operation: BrokerOperation) -> Result<(), BrokerError> {
        match self.faults.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(BrokerError::Unavailable(format!(
                    "injected {operation:?} failure"
                )))
            }
            _ => Ok(()),
        }
    }

    fn queue_mut(&mut self, queue: &QueueHandle) -> Result<&mut QueueRecord, BrokerError> {
        self.queues
            .get_mut(queue.locator())
            .ok_or_else(|| BrokerError::NotFound(format!("queue {}", queue.locator())))
    }
}

impl QueueRecord {
    fn push(&mut self, message_id: MessageId, body: String) {
        self.messages.push_back(StoredMessage {
            message_id,
            body,
            visible_at: Instant::now(),
            receipt: None,
            receive_count: 0,
        });
        self.notify.notify_one();
    }

    /// Hand out up to `request.max_messages` visible messages.
    fn take_visible(
        &mut self,
        now: Instant,
        request: ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, BrokerError> {
        let hidden_until = now
            .checked_add(request.visibility_timeout)
            .ok_or_else(|| BrokerError::Rejected("visibility timeout out of range".to_string()))?;
        let mut delivered = Vec::new();
        for message in self.messages.iter_mut() {
            if delivered.len() >= usize::from(request.max_messages) {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            let receipt = Receipt::new(Uuid::new_v4().simple().to_string());
            message.receipt = Some(receipt.clone());
            message.visible_at = hidden_until;
            message.receive_count += 1;
            if message.receive_count > 1 {
                debug!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    "Redelivering message after visibility timeout"
                );
            }
            delivered.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt,
                body: message.body.clone(),
            });
        }
        Ok(delivered)
    }

    /// Earliest time an in-flight message becomes visible again.
    fn next_visible_at(&self, now: Instant) -> Option<Instant> {
        self.messages
            .iter()
            .map(|message| message.visible_at)
            .filter(|visible_at| *visible_at > now)
            .min()
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), BrokerError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BrokerError::Rejected(format!("invalid {kind} name {name:?}")))
    }
}

#[async_trait]
impl BrokerProvider for InMemoryBroker {
    async fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::CreateTopic)?;
        validate_name("topic", name)?;

        let resource_id = ResourceId::new(format!("{TOPIC_ARN_PREFIX}:{name}"));
        state
            .topics
            .entry(resource_id.clone())
            .or_insert_with(|| {
                debug!(topic = %resource_id, "Topic created");
                TopicRecord {
                    subscriptions: Vec::new(),
                }
            });
        Ok(TopicHandle::new(name, resource_id))
    }

    async fn create_queue(&self, name: &str) -> Result<QueueHandle, BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::CreateQueue)?;
        validate_name("queue", name)?;

        let locator = format!("{QUEUE_LOCATOR_PREFIX}/{name}");
        state.queues.entry(locator.clone()).or_insert_with(|| {
            debug!(queue = %locator, "Queue created");
            QueueRecord {
                resource_id: ResourceId::new(format!("{QUEUE_ARN_PREFIX}:{name}")),
                policy: None,
                messages: VecDeque::new(),
                notify: Arc::new(Notify::new()),
            }
        });
        Ok(QueueHandle::new(name, locator))
    }

    async fn queue_resource_id(&self, queue: &QueueHandle) -> Result<ResourceId, BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::QueueResourceId)?;
        Ok(state.queue_mut(queue)?.resource_id.clone())
    }

    async fn subscribe(
        &self,
        topic: &TopicHandle,
        endpoint: &ResourceId,
    ) -> Result<SubscriptionHandle, BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::Subscribe)?;

        let record = state
            .topics
            .get_mut(topic.resource_id())
            .ok_or_else(|| BrokerError::NotFound(format!("topic {}", topic.resource_id())))?;

        if let Some((existing, _)) = record
            .subscriptions
            .iter()
            .find(|(_, queue)| queue == endpoint)
        {
            return Ok(existing.clone());
        }

        let subscription =
            SubscriptionHandle::new(format!("{}:{}", topic.resource_id(), Uuid::new_v4()));
        record
            .subscriptions
            .push((subscription.clone(), endpoint.clone()));
        Ok(subscription)
    }

    async fn set_queue_policy(&self, queue: &QueueHandle, policy: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::SetQueuePolicy)?;

        let document = PolicyDocument::from_json(policy)
            .map_err(|err| BrokerError::Rejected(format!("malformed policy: {err}")))?;
        state.queue_mut(queue)?.policy = Some(document);
        Ok(())
    }

    async fn publish(&self, topic: &TopicHandle, body: &str) -> Result<MessageId, BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::Publish)?;

        let topic_id = topic.resource_id();
        let endpoints: Vec<ResourceId> = state
            .topics
            .get(topic_id)
            .ok_or_else(|| BrokerError::NotFound(format!("topic {topic_id}")))?
            .subscriptions
            .iter()
            .map(|(_, endpoint)| endpoint.clone())
            .collect();

        let message_id = MessageId::new(Uuid::new_v4().to_string());
        let wrapped = DeliveryWrapper::notification(&message_id, topic_id, body)
            .to_json()
            .map_err(|err| BrokerError::Rejected(format!("cannot wrap message: {err}")))?;

        let mut delivered = 0usize;
        for queue in state.queues.values_mut() {
            if !endpoints.contains(&queue.resource_id) {
                continue;
            }
            let authorized = queue
                .policy
                .as_ref()
                .is_some_and(|policy| policy.allows_send(&queue.resource_id, topic_id));
            if !authorized {
                debug!(
                    topic = %topic_id,
                    queue = %queue.resource_id,
                    "Delivery dropped (queue policy does not admit topic)"
                );
                continue;
            }
            queue.push(MessageId::new(Uuid::new_v4().to_string()), wrapped.clone());
            delivered += 1;
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(topic = %topic_id, message_id = %message_id, queues = delivered, "Message published");
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        request: ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, BrokerError> {
        if request.max_messages == 0 {
            return Err(BrokerError::Rejected("max_messages must be at least 1".to_string()));
        }
        let deadline = Instant::now()
            .checked_add(request.wait_time)
            .ok_or_else(|| BrokerError::Rejected("wait time out of range".to_string()))?;

        loop {
            let (notify, wake_at) = {
                let mut state = self.state.lock();
                state.take_fault(BrokerOperation::Receive)?;
                let record = state.queue_mut(queue)?;

                let now = Instant::now();
                let delivered = record.take_visible(now, request)?;
                if !delivered.is_empty() || now >= deadline {
                    return Ok(delivered);
                }

                let wake_at = record
                    .next_visible_at(now)
                    .map_or(deadline, |visible_at| visible_at.min(deadline));
                (Arc::clone(&record.notify), wake_at)
            };

            // Either a publish notifies, an in-flight message expires, or the
            // wait window closes; all three re-check the queue.
            let _ = tokio::time::timeout_at(wake_at, notify.notified()).await;
        }
    }

    async fn delete_message(&self, queue: &QueueHandle, receipt: &Receipt) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.take_fault(BrokerOperation::DeleteMessage)?;
        let record = state.queue_mut(queue)?;

        let position = record
            .messages
            .iter()
            .position(|message| message.receipt.as_ref() == Some(receipt))
            .ok_or_else(|| {
                BrokerError::InvalidReceipt(format!("{receipt} is unknown or already committed"))
            })?;

        if record.messages[position].visible_at <= Instant::now() {
            return Err(BrokerError::InvalidReceipt(format!(
                "{receipt} expired with the visibility timeout"
            )));
        }

        if let Some(message) = record.messages.remove(position) {
            debug!(message_id = %message.message_id, "Message deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(visibility_secs: u64, wait_secs: u64) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: 1,
            visibility_timeout: Duration::from_secs(visibility_secs),
            wait_time: Duration::from_secs(wait_secs),
        }
    }

    /// Topic and queue wired together with an admitting policy.
    async fn bound_pair(broker: &InMemoryBroker) -> (TopicHandle, QueueHandle) {
        let topic = broker.create_topic("orders").await.unwrap();
        let queue = broker.create_queue("billing").await.unwrap();
        let queue_id = broker.queue_resource_id(&queue).await.unwrap();
        broker.subscribe(&topic, &queue_id).await.unwrap();
        let policy = PolicyDocument::build(&queue_id, topic.resource_id());
        broker
            .set_queue_policy(&queue, &policy.to_json().unwrap())
            .await
            .unwrap();
        (topic, queue)
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let broker = InMemoryBroker::new();
        let first = broker.create_topic("orders").await.unwrap();
        let second = broker.create_topic("orders").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(broker.topic_count(), 1);

        let q1 = broker.create_queue("billing").await.unwrap();
        let q2 = broker.create_queue("billing").await.unwrap();
        assert_eq!(q1, q2);
        assert_eq!(broker.queue_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.create_topic("has space").await,
            Err(BrokerError::Rejected(_))
        ));
        assert!(matches!(
            broker.create_queue(&"q".repeat(MAX_NAME_LEN + 1)).await,
            Err(BrokerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent_per_endpoint() {
        let broker = InMemoryBroker::new();
        let topic = broker.create_topic("orders").await.unwrap();
        let endpoint = ResourceId::new("arn:memory:sqs:local:billing");

        let first = broker.subscribe(&topic, &endpoint).await.unwrap();
        let second = broker.subscribe(&topic, &endpoint).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(broker.subscription_count(&topic), 1);
    }

    #[tokio::test]
    async fn test_publish_wraps_body() {
        let broker = InMemoryBroker::new();
        let (topic, queue) = bound_pair(&broker).await;

        let published = broker.publish(&topic, "payload").await.unwrap();
        let received = broker.receive(&queue, request(20, 0)).await.unwrap();
        assert_eq!(received.len(), 1);

        let wrapper = DeliveryWrapper::from_json(&received[0].body).unwrap();
        assert_eq!(wrapper.kind, "Notification");
        assert_eq!(wrapper.message_id, published.as_str());
        assert_eq!(wrapper.message, "payload");
        assert_eq!(wrapper.topic_arn.as_deref(), Some(topic.resource_id().as_str()));
    }

    #[tokio::test]
    async fn test_delivery_requires_policy() {
        let broker = InMemoryBroker::new();
        let topic = broker.create_topic("orders").await.unwrap();
        let queue = broker.create_queue("billing").await.unwrap();
        let queue_id = broker.queue_resource_id(&queue).await.unwrap();
        broker.subscribe(&topic, &queue_id).await.unwrap();

        broker.publish(&topic, "dropped").await.unwrap();
        assert_eq!(broker.queue_depth(&queue), 0);

        let other = ResourceId::new("arn:memory:sns:local:other");
        let wrong = PolicyDocument::build(&queue_id, &other);
        broker
            .set_queue_policy(&queue, &wrong.to_json().unwrap())
            .await
            .unwrap();
        broker.publish(&topic, "still dropped").await.unwrap();
        assert_eq!(broker.queue_depth(&queue), 0);
        assert_eq!(broker.published_count(), 2);
    }

    #[tokio::test]
    async fn test_set_policy_overwrites() {
        let broker = InMemoryBroker::new();
        let (topic, queue) = bound_pair(&broker).await;
        let queue_id = broker.queue_resource_id(&queue).await.unwrap();

        let replacement = PolicyDocument::build(&queue_id, &ResourceId::new("arn:memory:sns:local:x"));
        broker
            .set_queue_policy(&queue, &replacement.to_json().unwrap())
            .await
            .unwrap();

        assert_eq!(broker.queue_policy(&queue), Some(replacement));
        broker.publish(&topic, "dropped").await.unwrap();
        assert_eq!(broker.queue_depth(&queue), 0);
    }

    #[tokio::test]
    async fn test_malformed_policy_rejected() {
        let broker = InMemoryBroker::new();
        let queue = broker.create_queue("billing").await.unwrap();
        assert!(matches!(
            broker.set_queue_policy(&queue, "{not json").await,
            Err(BrokerError::Rejected(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_waits_out_window_when_empty() {
        let broker = InMemoryBroker::new();
        let (_, queue) = bound_pair(&broker).await;

        let started = Instant::now();
        let received = broker.receive(&queue, request(20, 5)).await.unwrap();
        assert!(received.is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_wakes_on_publish() {
        let broker = Arc::new(InMemoryBroker::new());
        let (topic, queue) = bound_pair(&broker).await;

        let publisher = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            publisher.publish(&topic, "late").await.unwrap();
        });

        let started = Instant::now();
        let received = broker.receive(&queue, request(20, 20)).await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_message_is_hidden_then_redelivered() {
        let broker = InMemoryBroker::new();
        let (topic, queue) = bound_pair(&broker).await;
        broker.publish(&topic, "once").await.unwrap();

        let first = broker.receive(&queue, request(10, 0)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(broker.receive(&queue, request(10, 0)).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(11)).await;
        let second = broker.receive(&queue, request(10, 0)).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message_id, first[0].message_id);
        assert_ne!(second[0].receipt, first[0].receipt);
    }

    #[tokio::test]
    async fn test_delete_consumes_receipt_once() {
        let broker = InMemoryBroker::new();
        let (topic, queue) = bound_pair(&broker).await;
        broker.publish(&topic, "once").await.unwrap();

        let received = broker.receive(&queue, request(30, 0)).await.unwrap();
        let receipt = &received[0].receipt;

        broker.delete_message(&queue, receipt).await.unwrap();
        assert_eq!(broker.queue_depth(&queue), 0);
        assert!(matches!(
            broker.delete_message(&queue, receipt).await,
            Err(BrokerError::InvalidReceipt(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_receipt_rejected() {
        let broker = InMemoryBroker::new();
        let (topic, queue) = bound_pair(&broker).await;
        broker.publish(&topic, "slow consumer").await.unwrap();

        let received = broker.receive(&queue, request(5, 0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(matches!(
            broker.delete_message(&queue, &received[0].receipt).await,
            Err(BrokerError::InvalidReceipt(_))
        ));
        assert_eq!(broker.queue_depth(&queue), 1);
    }

    #[tokio::test]
    async fn test_fault_injection_counts_down() {
        let broker = InMemoryBroker::new();
        broker.fail_next(BrokerOperation::CreateTopic, 2);

        assert!(matches!(
            broker.create_topic("orders").await,
            Err(BrokerError::Unavailable(_))
        ));
        assert!(broker.create_topic("orders").await.is_err());
        assert!(broker.create_topic("orders").await.is_ok());
    }

    #[tokio::test]
    async fn test_out_of_range_durations_rejected() {
        let broker = InMemoryBroker::new();
        let (topic, queue) = bound_pair(&broker).await;
        broker.publish(&topic, "kept").await.unwrap();

        assert!(matches!(
            broker.receive(&queue, request(u64::MAX, 0)).await,
            Err(BrokerError::Rejected(_))
        ));
        assert!(matches!(
            broker.receive(&queue, request(30, u64::MAX)).await,
            Err(BrokerError::Rejected(_))
        ));

        // Nothing was handed out, so the message is still visible.
        let received = broker.receive(&queue, request(30, 0)).await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].body.contains("kept"));
    }

    #[tokio::test]
    async fn test_unknown_queue_not_found() {
        let broker = InMemoryBroker::new();
        let ghost = QueueHandle::new("ghost", "memory://queues/ghost");
        assert!(matches!(
            broker.receive(&ghost, request(1, 0)).await,
            Err(BrokerError::NotFound(_))
        ));
        assert!(matches!(
            broker.inject_raw(&ghost, "x"),
            Err(BrokerError::NotFound(_))
        ));
    }
}
