//! Client commands.
//!
//! A client sends one JSON object per frame:
//!
//! ```text
//! {"function": "ls"}
//! {"function": "subscribe",   "path": "<string>"}
//! {"function": "unsubscribe", "path": "<string>"}
//! ```
//!
//! The set of functions is closed. Names are resolved through a static table
//! and anything outside it is rejected with [`CommandError::UnknownFunction`].

use serde_json::Value;
use thiserror::Error;

/// The kinds of command a client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// List the connection's current subscriptions.
    Ls,
    /// Subscribe to a channel.
    Subscribe,
    /// Unsubscribe from a channel.
    Unsubscribe,
}

/// Name-to-kind lookup table, in the order names are reported to clients.
const COMMAND_TABLE: [(&str, CommandKind); 3] = [
    ("ls", CommandKind::Ls),
    ("subscribe", CommandKind::Subscribe),
    ("unsubscribe", CommandKind::Unsubscribe),
];

impl CommandKind {
    /// Resolve a wire function name.
    pub fn from_name(name: &str) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
    }

    /// The wire function name.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Ls => "ls",
            CommandKind::Subscribe => "subscribe",
            CommandKind::Unsubscribe => "unsubscribe",
        }
    }

    /// Whether the command carries a `path`.
    pub fn requires_path(self) -> bool {
        !matches!(self, CommandKind::Ls)
    }
}

/// Comma-separated list of valid function names.
pub fn function_names() -> String {
    COMMAND_TABLE
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A decoded client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ls,
    Subscribe { path: String },
    Unsubscribe { path: String },
}

impl Command {
    /// The kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Ls => CommandKind::Ls,
            Command::Subscribe { .. } => CommandKind::Subscribe,
            Command::Unsubscribe { .. } => CommandKind::Unsubscribe,
        }
    }

    /// The raw path argument, if the command has one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Command::Ls => None,
            Command::Subscribe { path } | Command::Unsubscribe { path } => Some(path),
        }
    }
}

/// Reasons a client frame could not be turned into a [`Command`].
///
/// The `Display` text is what the client receives in its error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The frame is not JSON.
    #[error("Message is not json loadable.")]
    NotJson,

    /// The frame is JSON but not an object.
    #[error("Message must be a dict.")]
    NotAnObject,

    /// `function` is missing or not a known command.
    #[error("function must be one of: {names}.", names = function_names())]
    UnknownFunction,

    /// `path` is missing or not a string.
    #[error("Missing path.")]
    MissingPath,
}

/// Decode one client text frame.
pub fn decode_command(text: &str) -> Result<Command, CommandError> {
    let value: Value = serde_json::from_str(text).map_err(|_| CommandError::NotJson)?;
    let Value::Object(fields) = value else {
        return Err(CommandError::NotAnObject);
    };

    let kind = fields
        .get("function")
        .and_then(Value::as_str)
        .and_then(CommandKind::from_name)
        .ok_or(CommandError::UnknownFunction)?;

    if !kind.requires_path() {
        return Ok(Command::Ls);
    }

    let path = fields
        .get("path")
        .and_then(Value::as_str)
        .ok_or(CommandError::MissingPath)?
        .to_string();

    Ok(match kind {
        CommandKind::Subscribe => Command::Subscribe { path },
        _ => Command::Unsubscribe { path },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ls() {
        assert_eq!(decode_command(r#"{"function": "ls"}"#), Ok(Command::Ls));
        // Extra fields are ignored.
        assert_eq!(
            decode_command(r#"{"function": "ls", "path": "/api"}"#),
            Ok(Command::Ls)
        );
    }

    #[test]
    fn test_decode_subscribe_and_unsubscribe() {
        let cmd = decode_command(r#"{"function": "subscribe", "path": "/api/salads/1"}"#).unwrap();
        assert_eq!(cmd.kind(), CommandKind::Subscribe);
        assert_eq!(cmd.path(), Some("/api/salads/1"));

        let cmd = decode_command(r#"{"function": "unsubscribe", "path": "/api/salads/1"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Unsubscribe {
                path: "/api/salads/1".to_string()
            }
        );
    }

    #[test]
    fn test_decode_not_json() {
        assert_eq!(decode_command("not json"), Err(CommandError::NotJson));
        assert_eq!(decode_command(""), Err(CommandError::NotJson));
    }

    #[test]
    fn test_decode_not_an_object() {
        assert_eq!(decode_command("[1, 2]"), Err(CommandError::NotAnObject));
        assert_eq!(decode_command("\"ls\""), Err(CommandError::NotAnObject));
        assert_eq!(decode_command("null"), Err(CommandError::NotAnObject));
    }

    #[test]
    fn test_decode_unknown_function() {
        assert_eq!(decode_command("{}"), Err(CommandError::UnknownFunction));
        assert_eq!(
            decode_command(r#"{"function": "__init__"}"#),
            Err(CommandError::UnknownFunction)
        );
        assert_eq!(
            decode_command(r#"{"function": 3}"#),
            Err(CommandError::UnknownFunction)
        );
    }

    #[test]
    fn test_decode_missing_path() {
        assert_eq!(
            decode_command(r#"{"function": "subscribe"}"#),
            Err(CommandError::MissingPath)
        );
        assert_eq!(
            decode_command(r#"{"function": "unsubscribe", "path": 7}"#),
            Err(CommandError::MissingPath)
        );
    }

    #[test]
    fn test_unknown_function_message_lists_names() {
        assert_eq!(
            CommandError::UnknownFunction.to_string(),
            "function must be one of: ls, subscribe, unsubscribe."
        );
    }

    #[test]
    fn test_command_table_matches_names() {
        for (name, kind) in COMMAND_TABLE {
            assert_eq!(kind.name(), name);
            assert_eq!(CommandKind::from_name(name), Some(kind));
        }
        assert_eq!(CommandKind::from_name("LS"), None);
    }
}
