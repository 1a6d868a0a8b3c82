//! # Broker Resource Handles
//!
//! Typed handles for the broker-side resources the bus provisions and the
//! opaque tokens the broker hands back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a string newtype that is opaque to the bus.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a broker-issued value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true when the broker issued an empty value.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(
    /// Globally unique resource identifier (an ARN on AWS).
    ResourceId
);

opaque_id!(
    /// Identifier of a topic-to-queue subscription.
    SubscriptionHandle
);

opaque_id!(
    /// Token for one delivered-but-unacknowledged message instance.
    ///
    /// Redelivery of the same message yields a different receipt, so a
    /// receipt never identifies the logical message.
    Receipt
);

opaque_id!(
    /// Broker-assigned message identifier.
    MessageId
);

/// Handle to a provisioned topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicHandle {
    name: String,
    resource_id: ResourceId,
}

impl TopicHandle {
    /// Create a handle from the topic name and its resource identifier.
    pub fn new(name: impl Into<String>, resource_id: ResourceId) -> Self {
        Self {
            name: name.into(),
            resource_id,
        }
    }

    /// Topic name as requested at provisioning time.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource identifier used as the publish target and policy source.
    #[must_use]
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }
}

/// Handle to a provisioned queue.
///
/// The locator addresses the queue for receive/delete calls (a queue URL on
/// AWS). The queue's resource identifier is looked up separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    name: String,
    locator: String,
}

impl QueueHandle {
    /// Create a handle from the queue name and its locator.
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }

    /// Queue name as requested at provisioning time.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Broker address of the queue.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }
}
