//! Ports layer for the relay bus.
//!
//! Only outbound (driven) ports exist: the bus drives an external broker.

pub mod broker;

pub use broker::{BrokerProvider, ReceiveRequest, ReceivedMessage};
