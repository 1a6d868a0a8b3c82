//! # Domain Layer
//!
//! Pure data and rules with no broker I/O.
//!
//! - `envelope`: the [`Event`] record producers and consumers exchange
//! - `wrapper`: the broker's [`DeliveryWrapper`] and the two-layer decode
//! - `policy`: the [`PolicyDocument`] authorizing topic-to-queue delivery
//! - `resources`: handles and opaque tokens issued by the broker

pub mod envelope;
pub mod policy;
pub mod resources;
pub mod wrapper;

pub use envelope::{Event, EventBuilder, ENVELOPE_VERSION};
pub use policy::{ConditionEntry, PolicyDocument, StatementEntry};
pub use resources::{MessageId, QueueHandle, Receipt, ResourceId, SubscriptionHandle, TopicHandle};
pub use wrapper::{decode_delivery, DeliveryWrapper, NOTIFICATION_TYPE};
