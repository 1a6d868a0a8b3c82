//! # SNS/SQS Broker
//!
//! [`BrokerProvider`] backed by Amazon SNS topics and SQS queues. Each trait
//! method maps to one SDK call:
//!
//! | Operation | SDK call |
//! |-----------|----------|
//! | `create_topic` | `sns:CreateTopic` |
//! | `create_queue` | `sqs:CreateQueue` |
//! | `queue_resource_id` | `sqs:GetQueueAttributes(QueueArn)` |
//! | `subscribe` | `sns:Subscribe(protocol = sqs)` |
//! | `set_queue_policy` | `sqs:SetQueueAttributes(Policy)` |
//! | `publish` | `sns:Publish` |
//! | `receive` | `sqs:ReceiveMessage` |
//! | `delete_message` | `sqs:DeleteMessage` |

use std::env;
use std::fmt;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::operation::delete_message::DeleteMessageError;
use aws_sdk_sqs::types::QueueAttributeName;
use tracing::debug;

use crate::domain::{MessageId, QueueHandle, Receipt, ResourceId, SubscriptionHandle, TopicHandle};
use crate::error::BrokerError;
use crate::ports::{BrokerProvider, ReceiveRequest, ReceivedMessage};

/// Subscription protocol for queue endpoints.
const SQS_PROTOCOL: &str = "sqs";

/// Connection settings for the AWS backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsBrokerConfig {
    /// AWS region (optional; falls back to environment configuration).
    pub region: Option<String>,

    /// Custom endpoint URL (for SNS/SQS-compatible emulators).
    pub endpoint: Option<String>,
}

impl AwsBrokerConfig {
    /// Load from environment variables.
    ///
    /// - `AWS_REGION`: Region override
    /// - `RELAY_AWS_ENDPOINT`: Endpoint override (e.g. a local emulator)
    pub fn from_env() -> Self {
        Self {
            region: env::var("AWS_REGION").ok().filter(|v| !v.is_empty()),
            endpoint: env::var("RELAY_AWS_ENDPOINT").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// SNS/SQS broker provider.
#[derive(Clone)]
pub struct AwsBroker {
    sns: aws_sdk_sns::Client,
    sqs: aws_sdk_sqs::Client,
}

impl fmt::Debug for AwsBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsBroker").finish_non_exhaustive()
    }
}

impl AwsBroker {
    /// Build SNS and SQS clients from the shared AWS configuration chain.
    pub async fn connect(config: &AwsBrokerConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        Self::from_clients(
            aws_sdk_sns::Client::new(&shared_config),
            aws_sdk_sqs::Client::new(&shared_config),
        )
    }

    /// Wrap pre-built clients.
    pub fn from_clients(sns: aws_sdk_sns::Client, sqs: aws_sdk_sqs::Client) -> Self {
        Self { sns, sqs }
    }
}

/// Map an SDK failure onto the broker error classes.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> BrokerError
where
    E: std::error::Error + Send + Sync + 'static,
    R: fmt::Debug,
{
    let transient = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    );
    let detail = format!("{operation}: {}", DisplayErrorContext(err));
    if transient {
        BrokerError::Unavailable(detail)
    } else {
        BrokerError::Rejected(detail)
    }
}

/// A stale or foreign receipt handle is its own class; everything else
/// follows [`classify`].
fn classify_delete<R: fmt::Debug>(err: SdkError<DeleteMessageError, R>) -> BrokerError {
    let stale = err
        .as_service_error()
        .is_some_and(DeleteMessageError::is_receipt_handle_is_invalid);
    if stale {
        BrokerError::InvalidReceipt(format!("DeleteMessage: {}", DisplayErrorContext(err)))
    } else {
        classify("DeleteMessage", err)
    }
}

fn missing(operation: &str, field: &str) -> BrokerError {
    BrokerError::Rejected(format!("{operation}: response missing {field}"))
}

fn duration_secs(duration: std::time::Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl BrokerProvider for AwsBroker {
    async fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError> {
        let output = self
            .sns
            .create_topic()
            .name(name)
            .send()
            .await
            .map_err(|err| classify("CreateTopic", err))?;
        let arn = output.topic_arn.ok_or_else(|| missing("CreateTopic", "TopicArn"))?;
        Ok(TopicHandle::new(name, ResourceId::new(arn)))
    }

    async fn create_queue(&self, name: &str) -> Result<QueueHandle, BrokerError> {
        let output = self
            .sqs
            .create_queue()
            .queue_name(name)
            .send()
            .await
            .map_err(|err| classify("CreateQueue", err))?;
        let url = output.queue_url.ok_or_else(|| missing("CreateQueue", "QueueUrl"))?;
        Ok(QueueHandle::new(name, url))
    }

    async fn queue_resource_id(&self, queue: &QueueHandle) -> Result<ResourceId, BrokerError> {
        let output = self
            .sqs
            .get_queue_attributes()
            .queue_url(queue.locator())
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|err| classify("GetQueueAttributes", err))?;
        output
            .attributes
            .and_then(|mut attributes| attributes.remove(&QueueAttributeName::QueueArn))
            .map(ResourceId::new)
            .ok_or_else(|| missing("GetQueueAttributes", "QueueArn"))
    }

    async fn subscribe(
        &self,
        topic: &TopicHandle,
        endpoint: &ResourceId,
    ) -> Result<SubscriptionHandle, BrokerError> {
        let output = self
            .sns
            .subscribe()
            .topic_arn(topic.resource_id().as_str())
            .protocol(SQS_PROTOCOL)
            .endpoint(endpoint.as_str())
            .send()
            .await
            .map_err(|err| classify("Subscribe", err))?;
        let arn = output
            .subscription_arn
            .ok_or_else(|| missing("Subscribe", "SubscriptionArn"))?;
        Ok(SubscriptionHandle::new(arn))
    }

    async fn set_queue_policy(&self, queue: &QueueHandle, policy: &str) -> Result<(), BrokerError> {
        self.sqs
            .set_queue_attributes()
            .queue_url(queue.locator())
            .attributes(QueueAttributeName::Policy, policy)
            .send()
            .await
            .map_err(|err| classify("SetQueueAttributes", err))?;
        Ok(())
    }

    async fn publish(&self, topic: &TopicHandle, body: &str) -> Result<MessageId, BrokerError> {
        let output = self
            .sns
            .publish()
            .topic_arn(topic.resource_id().as_str())
            .message(body)
            .send()
            .await
            .map_err(|err| classify("Publish", err))?;
        let message_id = output.message_id.ok_or_else(|| missing("Publish", "MessageId"))?;
        Ok(MessageId::new(message_id))
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        request: ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, BrokerError> {
        let output = self
            .sqs
            .receive_message()
            .queue_url(queue.locator())
            .max_number_of_messages(i32::from(request.max_messages))
            .visibility_timeout(duration_secs(request.visibility_timeout))
            .wait_time_seconds(duration_secs(request.wait_time))
            .send()
            .await
            .map_err(|err| classify("ReceiveMessage", err))?;

        let mut received = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let (Some(receipt), Some(body)) = (message.receipt_handle, message.body) else {
                debug!(queue = %queue.locator(), "Skipping message without receipt or body");
                continue;
            };
            received.push(ReceivedMessage {
                message_id: MessageId::new(message.message_id.unwrap_or_default()),
                receipt: Receipt::new(receipt),
                body,
            });
        }
        Ok(received)
    }

    async fn delete_message(&self, queue: &QueueHandle, receipt: &Receipt) -> Result<(), BrokerError> {
        self.sqs
            .delete_message()
            .queue_url(queue.locator())
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(classify_delete)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use aws_sdk_sqs::types::error::ReceiptHandleIsInvalid;

    fn stale_receipt() -> DeleteMessageError {
        DeleteMessageError::ReceiptHandleIsInvalid(
            ReceiptHandleIsInvalid::builder().message("gone").build(),
        )
    }

    #[test]
    fn test_timeouts_are_unavailable() {
        let err = SdkError::<std::io::Error, ()>::timeout_error("timed out");
        assert!(matches!(
            classify("ReceiveMessage", err),
            BrokerError::Unavailable(msg) if msg.starts_with("ReceiveMessage: ")
        ));
    }

    #[test]
    fn test_construction_failure_is_rejected() {
        let err = SdkError::<std::io::Error, ()>::construction_failure("bad input");
        let classified = classify("Publish", err);
        assert!(matches!(classified, BrokerError::Rejected(_)));
        assert!(!classified.is_transient());
    }

    #[test]
    fn test_delete_with_stale_receipt_is_invalid_receipt() {
        let err = SdkError::service_error(stale_receipt(), ());
        assert!(matches!(
            classify_delete(err),
            BrokerError::InvalidReceipt(msg) if msg.starts_with("DeleteMessage: ")
        ));
    }

    #[test]
    fn test_delete_timeout_is_unavailable() {
        let err = SdkError::<DeleteMessageError, ()>::timeout_error("timed out");
        assert!(matches!(classify_delete(err), BrokerError::Unavailable(_)));
    }

    #[test]
    fn test_duration_secs_saturates() {
        assert_eq!(duration_secs(Duration::from_secs(20)), 20);
        assert_eq!(duration_secs(Duration::from_secs(u64::MAX)), i32::MAX);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        assert!(matches!(
            missing("Publish", "MessageId"),
            BrokerError::Rejected(msg) if msg == "Publish: response missing MessageId"
        ));
    }
}
