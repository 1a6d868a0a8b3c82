//! # Relay Bus - Topic/Queue Publish-Subscribe
//!
//! Producers publish [`Event`]s to a named topic; each consumer drains its
//! own queue subscribed to that topic. Delivery is at-least-once.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  write()   ┌─────────┐  fan-out   ┌─────────┐  read()   ┌──────────┐
//! │  Writer  │ ─────────→ │  Topic  │ ─────────→ │  Queue  │ ────────→ │  Reader  │
//! └──────────┘            └─────────┘  (policy)  └─────────┘ commit()  └──────────┘
//! ```
//!
//! - The topic wraps each body in a [`DeliveryWrapper`]; readers unwrap it.
//! - A queue only accepts deliveries its [`PolicyDocument`] admits.
//! - A received message stays hidden for the visibility timeout and comes
//!   back with a new [`Receipt`] unless committed.
//!
//! ## Layout
//!
//! - `domain`: envelope, wrapper, policy and resource handles (no I/O)
//! - `ports`: the [`BrokerProvider`] trait
//! - `adapters`: in-memory broker, SNS/SQS broker (`aws` feature)
//! - `service`: [`Provisioner`], [`Writer`], [`Reader`]

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;
pub mod shutdown;

// Re-export main types
pub use adapters::{BrokerOperation, InMemoryBroker};
#[cfg(feature = "aws")]
pub use adapters::{AwsBroker, AwsBrokerConfig};
pub use config::{BusConfig, ConfigError, ReceiveConfig};
pub use domain::{
    decode_delivery, DeliveryWrapper, Event, EventBuilder, MessageId, PolicyDocument, QueueHandle,
    Receipt, ResourceId, SubscriptionHandle, TopicHandle, ENVELOPE_VERSION,
};
pub use error::{
    BrokerError, CommitError, DecodeError, ProvisioningError, ProvisioningStep, ReadError,
    WriteError,
};
pub use ports::{BrokerProvider, ReceiveRequest, ReceivedMessage};
pub use service::{ConsumerBinding, Delivery, Provisioner, Reader, Writer};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
