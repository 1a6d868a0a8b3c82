//! # Reader
//!
//! Drains one queue with at-least-once semantics.
//!
//! ## Delivery lifecycle
//!
//! ```text
//! visible ──receive──→ in flight ──commit──→ deleted
//!    ↑                     │
//!    └──visibility timeout─┘   (redelivered with a new receipt)
//! ```
//!
//! `read` blocks until a message is available, riding out empty polls and
//! transient transport errors. Decode failures, permanent broker errors and
//! cancellation end it early. A
//! message that fails to decode still comes back with its receipt so the
//! caller can commit it and drop the poison message.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{BusConfig, ReceiveConfig};
use crate::domain::{decode_delivery, Event, MessageId, Receipt};
use crate::error::{CommitError, ProvisioningError, ReadError};
use crate::ports::BrokerProvider;
use crate::service::provisioner::{ConsumerBinding, Provisioner};
use crate::shutdown::Shutdown;

/// A decoded event plus the receipt needed to commit it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: Event,
    pub receipt: Receipt,
    /// Broker-assigned id of this message instance.
    pub message_id: MessageId,
}

/// Consumer bound to a single queue subscribed to a single topic.
#[derive(Clone)]
pub struct Reader {
    broker: Arc<dyn BrokerProvider>,
    binding: ConsumerBinding,
    receive: ReceiveConfig,
}

impl Reader {
    /// Validate `config`, provision the topic/queue pair and bind a reader
    /// to the queue. An invalid config fails before any broker call.
    pub async fn new(
        broker: Arc<dyn BrokerProvider>,
        config: &BusConfig,
    ) -> Result<Self, ProvisioningError> {
        config.validate()?;
        let binding = Provisioner::new(Arc::clone(&broker))
            .provision_consumer(&config.topic, &config.queue)
            .await?;
        Ok(Self::from_binding(broker, binding, config.receive))
    }

    /// Bind to an already provisioned consumer.
    pub fn from_binding(
        broker: Arc<dyn BrokerProvider>,
        binding: ConsumerBinding,
        receive: ReceiveConfig,
    ) -> Self {
        Self {
            broker,
            binding,
            receive,
        }
    }

    pub fn binding(&self) -> &ConsumerBinding {
        &self.binding
    }

    /// Issue a single receive call.
    ///
    /// Returns `Ok(None)` when the wait window closes with nothing visible.
    /// Transport failures surface as [`ReadError::Transport`].
    pub async fn poll_once(&self) -> Result<Option<Delivery>, ReadError> {
        let messages = self
            .broker
            .receive(&self.binding.queue, self.receive.request())
            .await
            .map_err(ReadError::Transport)?;

        let Some(message) = messages.into_iter().next() else {
            return Ok(None);
        };

        match decode_delivery(&message.body) {
            Ok(event) => {
                debug!(
                    queue = %self.binding.queue.name(),
                    event_id = %event.id(),
                    message_id = %message.message_id,
                    "Event received"
                );
                Ok(Some(Delivery {
                    event,
                    receipt: message.receipt,
                    message_id: message.message_id,
                }))
            }
            Err(source) => {
                warn!(
                    queue = %self.binding.queue.name(),
                    message_id = %message.message_id,
                    error = %source,
                    "Received message did not decode"
                );
                Err(ReadError::Decode {
                    receipt: message.receipt,
                    source,
                })
            }
        }
    }

    /// Block until the next event arrives or `shutdown` fires.
    ///
    /// Empty polls and transient transport errors are absorbed; transient
    /// errors are logged and followed by the configured backoff. Permanent
    /// broker errors (missing queue, rejected request) are returned as
    /// [`ReadError::Transport`].
    pub async fn read(&self, shutdown: &mut Shutdown) -> Result<Delivery, ReadError> {
        loop {
            if shutdown.is_triggered() {
                return Err(ReadError::Cancelled);
            }

            let polled = tokio::select! {
                biased;
                () = shutdown.triggered() => return Err(ReadError::Cancelled),
                polled = self.poll_once() => polled,
            };

            match polled {
                Ok(Some(delivery)) => return Ok(delivery),
                Ok(None) => {
                    // Without long polling an empty queue would spin.
                    if self.receive.wait_time_secs == 0 {
                        self.pause(shutdown).await?;
                    }
                }
                Err(ReadError::Transport(err)) if err.is_transient() => {
                    warn!(
                        queue = %self.binding.queue.name(),
                        error = %err,
                        backoff_ms = self.receive.error_backoff_ms,
                        "Receive failed, retrying"
                    );
                    self.pause(shutdown).await?;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Acknowledge a delivery so it is never redelivered.
    pub async fn commit(&self, receipt: &Receipt) -> Result<(), CommitError> {
        self.broker
            .delete_message(&self.binding.queue, receipt)
            .await
            .map_err(|source| CommitError {
                receipt: receipt.clone(),
                source,
            })?;
        debug!(queue = %self.binding.queue.name(), receipt = %receipt, "Message committed");
        Ok(())
    }

    async fn pause(&self, shutdown: &mut Shutdown) -> Result<(), ReadError> {
        tokio::select! {
            biased;
            () = shutdown.triggered() => Err(ReadError::Cancelled),
            () = tokio::time::sleep(self.receive.error_backoff()) => Ok(()),
        }
    }
}
