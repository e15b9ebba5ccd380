use std::time::Duration;

/// Errors that can occur in the transport layer.
///
/// These never reach the user directly. The session layer turns every one
/// of them into a technical, retryable failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No response arrived within the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server could not be reached at all.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request was sent but failed mid-flight (reset, bad body, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The base URL and path don't form a valid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The transport could not be constructed.
    #[error("transport setup failed: {0}")]
    Setup(String),
}

impl TransportError {
    /// `true` for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
