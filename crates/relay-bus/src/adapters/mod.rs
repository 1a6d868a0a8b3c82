//! # Adapters Layer
//!
//! Broker providers implementing [`crate::ports::BrokerProvider`].

#[cfg(feature = "aws")]
pub mod aws;
pub mod memory;

#[cfg(feature = "aws")]
pub use aws::{AwsBroker, AwsBrokerConfig};
pub use memory::{BrokerOperation, InMemoryBroker};
