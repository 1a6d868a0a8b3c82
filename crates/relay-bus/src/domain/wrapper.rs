//! # Delivery Wrapper
//!
//! The broker wraps every published body in its own notification envelope
//! before handing it to a subscribed queue. Reading an event is therefore a
//! two-layer decode: wrapper first, then the [`Event`] serialized in its
//! `Message` field.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::envelope::Event;
use crate::domain::resources::{MessageId, ResourceId};
use crate::error::DecodeError;

/// `Type` value of a topic notification.
pub const NOTIFICATION_TYPE: &str = "Notification";

/// Broker-imposed delivery envelope.
///
/// Unknown fields (signatures, unsubscribe links) are ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryWrapper {
    #[serde(rename = "Type")]
    pub kind: String,

    pub message_id: String,

    /// Published body, verbatim.
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl DeliveryWrapper {
    /// Wrap a published body the way a topic does on fan-out.
    pub fn notification(message_id: &MessageId, topic: &ResourceId, message: impl Into<String>) -> Self {
        Self {
            kind: NOTIFICATION_TYPE.to_string(),
            message_id: message_id.to_string(),
            message: message.into(),
            topic_arn: Some(topic.to_string()),
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Decode a queue message body into the event it carries.
pub fn decode_delivery(body: &str) -> Result<Event, DecodeError> {
    let wrapper = DeliveryWrapper::from_json(body).map_err(DecodeError::Wrapper)?;
    Event::from_json(&wrapper.message).map_err(DecodeError::Envelope)
}
