//! Notification bridge error types.

use thiserror::Error;

/// Service-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A broker socket operation failed.
    #[error("broker error: {0}")]
    Broker(String),

    /// The broker could not be reached at startup.
    #[error("broker unreachable at {url}: {reason}")]
    BrokerUnreachable { url: String, reason: String },

    /// No subscriber handle became free in time.
    #[error("subscriber pool exhausted (max: {0})")]
    PoolExhausted(usize),

    /// The existence probe could not complete.
    #[error("probe error: {0}")]
    Probe(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] saladbar_proto::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Probe(err.to_string())
    }
}

/// Why a subscribe or unsubscribe was refused.
///
/// The `Display` text is what the client receives in its error reply. None of
/// these leave the subscription set changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The channel is already in the subscription set.
    #[error("Already subscribed to path: {0}")]
    AlreadySubscribed(String),

    /// The channel is not in the subscription set.
    #[error("Not subscribed to path: {0}")]
    NotSubscribed(String),

    /// The channel does not name an existing API resource.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The broker refused to (un)register the channel.
    #[error("Subscription failed: {0}")]
    Broker(String),
}

pub type Result<T> = std::result::Result<T, Error>;
