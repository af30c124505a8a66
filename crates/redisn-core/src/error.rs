//! Error types for subscription sessions.

use redisn_protocol::Reply;
use redisn_transport::TransportError;
use thiserror::Error;

/// Errors returned by subscribe/unsubscribe calls or delivered to a handler.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The verb is not one of the two accepted by this operation.
    #[error("the given command '{verb}' is not supported by {operation}. Please use {expected}")]
    UnsupportedCommand {
        /// The rejected verb, as given.
        verb: String,
        /// The operation that rejected it.
        operation: &'static str,
        /// The accepted alternatives.
        expected: &'static str,
    },

    /// A subscription acknowledgement did not confirm the subscription.
    #[error("failed to subscribe to key: {key}")]
    SubscriptionFailed {
        /// The key the failing acknowledgement referred to.
        key: String,
    },

    /// Connection or codec failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A pushed reply of an unrecognized shape arrived while listening.
    #[error("received an unexpected reply while listening: {raw}")]
    UnexpectedReply {
        /// The reply as it came off the wire.
        raw: Reply,
    },

    /// No session is listening, so there is no connection to use.
    #[error("no active subscription session")]
    NoActiveSession,

    /// The key list of a request is not acceptable.
    #[error("invalid keys: {0}")]
    InvalidKeys(String),
}

impl NotifyError {
    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyError::UnsupportedCommand { .. } => "unsupported_command",
            NotifyError::SubscriptionFailed { .. } => "subscription_failed",
            NotifyError::Transport(_) => "transport",
            NotifyError::UnexpectedReply { .. } => "unexpected_reply",
            NotifyError::NoActiveSession => "no_active_session",
            NotifyError::InvalidKeys(_) => "invalid_keys",
        }
    }
}
