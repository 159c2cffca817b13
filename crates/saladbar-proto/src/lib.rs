//! Salad bar notification protocol types.
//!
//! This crate defines everything that crosses a wire in the notification
//! bridge: the JSON control frames a websocket client sends, the replies and
//! forwarded events it receives, and the frames carried by the broker.
//!
//! # Modules
//!
//! - [`path`] - Channel path canonicalization and the reserved API prefix
//! - [`command`] - Client commands (`ls`, `subscribe`, `unsubscribe`)
//! - [`event`] - Broker event envelopes and change payloads
//! - [`message`] - Server-to-client replies and forwarded events
//! - [`framing`] - Channel-tagged broker frames
//! - [`error`] - Protocol error types

pub mod command;
pub mod error;
pub mod event;
pub mod framing;
pub mod message;
pub mod path;

pub use command::{decode_command, Command, CommandError, CommandKind};
pub use error::Error;
pub use event::{BrokerEvent, ChangePayload, EventKind};
pub use message::ServerMessage;
pub use path::{canonicalize, has_api_prefix, ChannelPath, API_PREFIX};
