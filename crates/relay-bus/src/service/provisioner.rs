//! # Provisioner
//!
//! Idempotently sets up the broker resources a producer or consumer needs.
//!
//! Consumer setup runs in a fixed order and stops at the first failure:
//!
//! ```text
//! ensure queue ──→ resolve queue id ──→ ensure topic ──→ subscribe ──→ authorize
//! ```
//!
//! Completed steps are not rolled back; every step is create-or-get, so
//! provisioning again after a failure converges.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{PolicyDocument, QueueHandle, ResourceId, SubscriptionHandle, TopicHandle};
use crate::error::{BrokerError, ProvisioningError, ProvisioningStep};
use crate::ports::BrokerProvider;

/// Everything a consumer needs after provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerBinding {
    pub topic: TopicHandle,
    pub queue: QueueHandle,
    pub queue_resource_id: ResourceId,
    pub subscription: SubscriptionHandle,
    /// Access policy installed on the queue.
    pub policy: PolicyDocument,
}

/// Creates topics and queues, subscribes queues and installs access policies.
#[derive(Clone)]
pub struct Provisioner {
    broker: Arc<dyn BrokerProvider>,
}

impl Provisioner {
    pub fn new(broker: Arc<dyn BrokerProvider>) -> Self {
        Self { broker }
    }

    /// Create the topic, or return the existing one.
    pub async fn ensure_topic(&self, name: &str) -> Result<TopicHandle, ProvisioningError> {
        let topic = self
            .broker
            .create_topic(name)
            .await
            .map_err(step_error(ProvisioningStep::Topic, name))?;
        debug!(topic = %topic.resource_id(), "Topic ready");
        Ok(topic)
    }

    /// Create the queue, or return the existing one.
    pub async fn ensure_queue(&self, name: &str) -> Result<QueueHandle, ProvisioningError> {
        let queue = self
            .broker
            .create_queue(name)
            .await
            .map_err(step_error(ProvisioningStep::Queue, name))?;
        debug!(queue = %queue.locator(), "Queue ready");
        Ok(queue)
    }

    /// Resolve the queue's resource identifier.
    pub async fn resource_id_of(&self, queue: &QueueHandle) -> Result<ResourceId, ProvisioningError> {
        self.broker
            .queue_resource_id(queue)
            .await
            .map_err(step_error(ProvisioningStep::ResourceId, queue.name()))
    }

    /// Subscribe the queue identified by `queue_id` to `topic`.
    pub async fn bind(
        &self,
        topic: &TopicHandle,
        queue_id: &ResourceId,
    ) -> Result<SubscriptionHandle, ProvisioningError> {
        let subscription = self
            .broker
            .subscribe(topic, queue_id)
            .await
            .map_err(step_error(ProvisioningStep::Subscribe, topic.name()))?;
        debug!(
            topic = %topic.resource_id(),
            queue = %queue_id,
            subscription = %subscription,
            "Queue subscribed"
        );
        Ok(subscription)
    }

    /// Install the policy letting `topic` send into the queue.
    ///
    /// Replaces any policy already on the queue.
    pub async fn authorize(
        &self,
        queue: &QueueHandle,
        queue_id: &ResourceId,
        topic: &TopicHandle,
    ) -> Result<PolicyDocument, ProvisioningError> {
        let policy = PolicyDocument::build(queue_id, topic.resource_id());
        let json = policy
            .to_json()
            .map_err(|source| ProvisioningError::PolicyEncoding {
                queue: queue.name().to_string(),
                source,
            })?;

        self.broker
            .set_queue_policy(queue, &json)
            .await
            .map_err(step_error(ProvisioningStep::Authorize, queue.name()))?;
        debug!(queue = %queue_id, topic = %topic.resource_id(), "Queue policy installed");
        Ok(policy)
    }

    /// Full consumer setup for a topic/queue pair.
    pub async fn provision_consumer(
        &self,
        topic_name: &str,
        queue_name: &str,
    ) -> Result<ConsumerBinding, ProvisioningError> {
        let queue = self.ensure_queue(queue_name).await?;
        let queue_resource_id = self.resource_id_of(&queue).await?;
        let topic = self.ensure_topic(topic_name).await?;
        let subscription = self.bind(&topic, &queue_resource_id).await?;
        let policy = self.authorize(&queue, &queue_resource_id, &topic).await?;

        info!(
            topic = %topic.resource_id(),
            queue = %queue_resource_id,
            "Consumer provisioned"
        );

        Ok(ConsumerBinding {
            topic,
            queue,
            queue_resource_id,
            subscription,
            policy,
        })
    }
}

fn step_error(step: ProvisioningStep, resource: &str) -> impl FnOnce(BrokerError) -> ProvisioningError + '_ {
    move |source| ProvisioningError::Broker {
        step,
        resource: resource.to_string(),
        source,
    }
}
