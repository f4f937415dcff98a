//! Dispatcher error types.

use thiserror::Error;

/// Why an upstream fetch produced no usable response.
///
/// The `Display` text is for logs only; callers get a fixed generic error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid target URL '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("unsupported target scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to connect to upstream: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("upstream timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read upstream body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("upstream body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

impl DispatchError {
    /// Classify a transport-level error from the send phase.
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout(err)
        } else if err.is_connect() {
            DispatchError::Connect(err)
        } else {
            DispatchError::Request(err)
        }
    }

    /// Classify an error raised while streaming the body.
    pub fn from_body(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout(err)
        } else {
            DispatchError::Body(err)
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidTarget { .. } => "invalid_target",
            DispatchError::UnsupportedScheme(_) => "unsupported_scheme",
            DispatchError::Connect(_) => "connect",
            DispatchError::Timeout(_) => "timeout",
            DispatchError::Request(_) => "request",
            DispatchError::Body(_) => "body",
            DispatchError::BodyTooLarge { .. } => "body_too_large",
            DispatchError::Client(_) => "client",
        }
    }
}
