//! Error types for the protocol layer.
//!
//! Each crate in otpgate defines its own error enum. A `ProtocolError`
//! always means the bytes were wrong, never the network or the session.

/// Errors that can occur while encoding requests or decoding responses.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, wrong
    /// types, a proxy's HTML error page where JSON was expected.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload parsed but violates the API contract, e.g. a success
    /// response to "create session" with a blank session id.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
