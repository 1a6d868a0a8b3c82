//! # Event Envelope
//!
//! The standardized event record exchanged between producers and consumers.
//! Field names follow the CloudEvents v0.1 JSON format.
//!
//! Identity and creation time are stamped by the envelope itself: callers
//! supply the category, the producer and the payload, never `eventID` or
//! `eventTime`. Once built, an [`Event`] has no mutators.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version of the envelope itself, independent of payload versions.
pub const ENVELOPE_VERSION: &str = "0.1";

/// One application-level event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    event_type: String,

    #[serde(default, skip_serializing_if = "is_unset")]
    event_type_version: Option<String>,

    #[serde(rename = "cloudEventsVersion")]
    envelope_version: String,

    source: String,

    #[serde(rename = "eventID")]
    id: String,

    #[serde(rename = "eventTime")]
    time: String,

    #[serde(default, skip_serializing_if = "is_unset")]
    content_type: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extensions: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    data: BTreeMap<String, String>,
}

impl Event {
    /// Create an event with a fresh id and timestamp.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self::builder(event_type, source).data(data).build()
    }

    /// Start building an event that carries optional envelope fields.
    pub fn builder(event_type: impl Into<String>, source: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type, source)
    }

    /// Application-defined category.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Version of the application-defined category, if any.
    #[must_use]
    pub fn event_type_version(&self) -> Option<&str> {
        self.event_type_version.as_deref()
    }

    /// Envelope schema version (`cloudEventsVersion`).
    #[must_use]
    pub fn envelope_version(&self) -> &str {
        &self.envelope_version
    }

    /// Producer identity.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Unique event id (`eventID`). Consumers deduplicate on this.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// RFC 3339 creation time (`eventTime`).
    #[must_use]
    pub fn time(&self) -> &str {
        &self.time
    }

    /// Payload media type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    /// Application payload.
    #[must_use]
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// Look up a single payload entry.
    #[must_use]
    pub fn datum(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Encode to the canonical JSON form used as a message body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the canonical JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Builder for [`Event`] values with optional envelope fields.
///
/// The id and timestamp are assigned in [`EventBuilder::build`], not when the
/// builder is created.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event_type: String,
    source: String,
    event_type_version: Option<String>,
    content_type: Option<String>,
    extensions: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

impl EventBuilder {
    fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            event_type_version: None,
            content_type: None,
            extensions: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    /// Set the event type version.
    #[must_use]
    pub fn type_version(mut self, version: impl Into<String>) -> Self {
        self.event_type_version = non_empty(version.into());
        self
    }

    /// Set the payload media type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = non_empty(content_type.into());
        self
    }

    /// Add one extension attribute.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Replace the payload.
    #[must_use]
    pub fn data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }

    /// Add one payload entry.
    #[must_use]
    pub fn datum(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Stamp id and time and produce the immutable event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            event_type: self.event_type,
            event_type_version: self.event_type_version,
            envelope_version: ENVELOPE_VERSION.to_string(),
            source: self.source,
            id: Uuid::new_v4().to_string(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            content_type: self.content_type,
            extensions: self.extensions,
            data: self.data,
        }
    }
}

/// Empty optional strings count as absent on the wire.
fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
