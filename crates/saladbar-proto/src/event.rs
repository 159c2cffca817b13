//! Broker event envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Change type published when a document is added to a collection.
pub const CHANGE_CREATE: &str = "CREATE";

/// What a broker event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A change was published on the channel.
    Message,
    /// The subscriber handle started listening on the channel.
    Subscribe,
    /// The subscriber handle stopped listening on the channel.
    Unsubscribe,
}

impl EventKind {
    /// The wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Subscribe => "subscribe",
            EventKind::Unsubscribe => "unsubscribe",
        }
    }
}

/// The body of a published change: `{"data": ..., "type": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    /// Serialized form of the affected resource.
    pub data: Value,
    /// Kind of change, e.g. `CREATE`.
    #[serde(rename = "type")]
    pub change_type: String,
}

impl ChangePayload {
    /// Create a payload for an arbitrary change type.
    pub fn new(change_type: impl Into<String>, data: Value) -> Self {
        Self {
            data,
            change_type: change_type.into(),
        }
    }

    /// Create a `CREATE` payload.
    pub fn created(data: Value) -> Self {
        Self::new(CHANGE_CREATE, data)
    }

    /// Encode as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}

/// An event delivered to a subscriber handle.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Canonical channel path the event belongs to.
    pub channel: String,
    /// The change, present for [`EventKind::Message`] only.
    pub payload: Option<ChangePayload>,
}

impl BrokerEvent {
    /// A published change on `channel`.
    pub fn message(channel: impl Into<String>, payload: ChangePayload) -> Self {
        Self {
            kind: EventKind::Message,
            channel: channel.into(),
            payload: Some(payload),
        }
    }

    /// Confirmation that `channel` was subscribed.
    pub fn subscribed(channel: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Subscribe,
            channel: channel.into(),
            payload: None,
        }
    }

    /// Confirmation that `channel` was unsubscribed.
    pub fn unsubscribed(channel: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Unsubscribe,
            channel: channel.into(),
            payload: None,
        }
    }
}
