//! Chat operation errors

use thiserror::Error;

use crate::transport::StreamMechanism;

/// Errors raised while obtaining a bot reply
#[derive(Debug, Error)]
pub enum ChatError {
    /// The mechanism cannot run in this environment
    #[error("{0} streaming is not supported in this environment")]
    Unsupported(StreamMechanism),

    /// No streaming mechanism is usable at all
    #[error("no streaming mechanism is available")]
    NoMechanism,

    /// The backend answered with a non-success status
    #[error("backend returned HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// The request could not be sent
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The reply stream broke after it was opened
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// The backend reported an error inside a frame
    #[error("backend reported an error: {0}")]
    Remote(String),

    /// The stream closed before a `done` frame arrived
    #[error("stream ended before the reply completed")]
    Incomplete,

    /// The response payload could not be decoded
    #[error("invalid response payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The operation was cancelled by its owner
    #[error("operation cancelled")]
    Cancelled,
}

impl ChatError {
    /// Whether this error only means "try the next mechanism"
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
