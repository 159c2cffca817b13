//! Server-to-client messages.
//!
//! ```text
//! {"error": "<message>"}                                   any failure
//! ["<path1>", "<path2>", ...]                               ls reply, sorted
//! {"function": "message", "path": "<channel>",
//!  "data": <any>, "type": "<string>"}                        forwarded change
//! {"function": "subscribe"|"unsubscribe", "path": "<channel>"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{BrokerEvent, EventKind};

/// A forwarded broker event as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event kind.
    pub function: EventKind,
    /// Channel the event was published on.
    pub path: String,
    /// Affected resource, for `message` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Change type, for `message` events.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<String>,
}

impl From<BrokerEvent> for EventMessage {
    fn from(event: BrokerEvent) -> Self {
        let (data, change_type) = match event.payload {
            Some(payload) => (Some(payload.data), Some(payload.change_type)),
            None => (None, None),
        };
        Self {
            function: event.kind,
            path: event.channel,
            data,
            change_type,
        }
    }
}

/// Any frame the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Reply to `ls`: current subscriptions, sorted.
    Listing(Vec<String>),
    /// A recoverable failure.
    Error { error: String },
    /// A forwarded broker event.
    Event(EventMessage),
}

impl ServerMessage {
    /// An error reply carrying `message`'s display text.
    pub fn error(message: impl fmt::Display) -> Self {
        ServerMessage::Error {
            error: message.to_string(),
        }
    }

    /// An `ls` reply. The paths are sorted lexicographically.
    pub fn listing<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        paths.sort();
        ServerMessage::Listing(paths)
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> String {
        // Every variant is plain data with string keys, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<BrokerEvent> for ServerMessage {
    fn from(event: BrokerEvent) -> Self {
        ServerMessage::Event(event.into())
    }
}
