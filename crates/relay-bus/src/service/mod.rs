//! # Service Layer
//!
//! Producer and consumer entry points built on a [`crate::ports::BrokerProvider`].

pub mod provisioner;
pub mod reader;
pub mod writer;

pub use provisioner::{ConsumerBinding, Provisioner};
pub use reader::{Delivery, Reader};
pub use writer::Writer;
