//! Error types for the relay bus.
//!
//! | Kind | Type | Surfaced by |
//! |------|------|-------------|
//! | Transport | [`BrokerError`] | every broker call |
//! | Provisioning | [`ProvisioningError`] | `Provisioner`, `Writer::new`, `Reader::new` |
//! | Serialization | [`WriteError::Serialization`], [`ProvisioningError::PolicyEncoding`] | single operation |
//! | Decode | [`DecodeError`] inside [`ReadError::Decode`] | `Reader::read`, `Reader::poll_once` |

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::Receipt;

/// Classified failure returned by a broker provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached or timed out. Expected to clear.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The addressed topic or queue does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The receipt was already committed, expired, or never issued.
    #[error("Invalid receipt: {0}")]
    InvalidReceipt(String),

    /// The broker refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl BrokerError {
    /// Returns true for conditions a caller may retry without change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Provisioning step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningStep {
    /// Configuration check before any broker call.
    Configure,
    /// Topic create-or-get.
    Topic,
    /// Queue create-or-get.
    Queue,
    /// Queue resource identifier lookup.
    ResourceId,
    /// Topic-to-queue subscription.
    Subscribe,
    /// Access policy installation.
    Authorize,
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configure => "validate configuration for",
            Self::Topic => "ensure topic",
            Self::Queue => "ensure queue",
            Self::ResourceId => "resolve resource id of",
            Self::Subscribe => "subscribe queue to",
            Self::Authorize => "authorize delivery into",
        };
        f.write_str(label)
    }
}

/// Provisioning failed. Steps completed before the failure are not undone.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Invalid bus configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to {step} `{resource}`: {source}")]
    Broker {
        step: ProvisioningStep,
        resource: String,
        #[source]
        source: BrokerError,
    },

    #[error("Failed to encode access policy for `{queue}`: {source}")]
    PolicyEncoding {
        queue: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProvisioningError {
    /// The step that aborted provisioning.
    #[must_use]
    pub fn step(&self) -> ProvisioningStep {
        match self {
            Self::Config(_) => ProvisioningStep::Configure,
            Self::Broker { step, .. } => *step,
            Self::PolicyEncoding { .. } => ProvisioningStep::Authorize,
        }
    }
}

/// Publishing an event failed. Never retried internally.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to serialize event {event_id}: {source}")]
    Serialization {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to publish to {topic}: {source}")]
    Transport {
        topic: String,
        #[source]
        source: BrokerError,
    },
}

/// A received body did not parse.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Outer broker delivery wrapper.
    #[error("Malformed delivery wrapper: {0}")]
    Wrapper(#[source] serde_json::Error),

    /// Inner event envelope carried in the wrapper's `Message` field.
    #[error("Malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

/// Reading from a queue failed.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The message arrived but did not decode. The receipt is still valid,
    /// so the caller may commit it to drop a poison message.
    #[error("Failed to decode message (receipt {receipt}): {source}")]
    Decode {
        receipt: Receipt,
        #[source]
        source: DecodeError,
    },

    /// Receive failed. `read()` retries transient failures and returns
    /// permanent ones.
    #[error("Receive failed: {0}")]
    Transport(#[source] BrokerError),

    #[error("Read cancelled by shutdown")]
    Cancelled,
}

impl ReadError {
    /// Receipt of the undecodable message, if this is a decode failure.
    #[must_use]
    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            Self::Decode { receipt, .. } => Some(receipt),
            Self::Transport(_) | Self::Cancelled => None,
        }
    }
}

/// Acknowledging a message failed.
#[derive(Debug, Error)]
#[error("Failed to commit receipt {receipt}: {source}")]
pub struct CommitError {
    pub receipt: Receipt,
    #[source]
    pub source: BrokerError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(BrokerError::Unavailable("timeout".into()).is_transient());
        assert!(!BrokerError::NotFound("q".into()).is_transient());
        assert!(!BrokerError::InvalidReceipt("r".into()).is_transient());
        assert!(!BrokerError::Rejected("denied".into()).is_transient());
    }

    #[test]
    fn test_provisioning_error_display() {
        let err = ProvisioningError::Broker {
            step: ProvisioningStep::Subscribe,
            resource: "orders".into(),
            source: BrokerError::Rejected("denied".into()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to subscribe queue to `orders`: Request rejected: denied"
        );
        assert_eq!(err.step(), ProvisioningStep::Subscribe);
    }

    #[test]
    fn test_config_error_maps_to_configure_step() {
        let err = ProvisioningError::from(ConfigError::ZeroErrorBackoff);
        assert_eq!(err.step(), ProvisioningStep::Configure);
        assert!(err.to_string().starts_with("Invalid bus configuration: "));
    }

    #[test]
    fn test_read_error_receipt() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ReadError::Decode {
            receipt: Receipt::new("r-1"),
            source: DecodeError::Wrapper(source),
        };
        assert_eq!(err.receipt().map(Receipt::as_str), Some("r-1"));
        assert!(ReadError::Cancelled.receipt().is_none());
    }
}
