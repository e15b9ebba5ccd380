//! Codec trait and the JSON implementation.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The session layer never calls `serde_json` directly; it goes through a
//! [`Codec`], so a test or an alternative backend can swap the format
//! without touching the manager.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes request bodies and decodes response bodies.
///
/// ## Trait bounds
///
/// - `Send + Sync` → shared by the session manager across tasks.
/// - `'static` → owns everything it needs, no borrowed state.
///
/// `decode` takes `DeserializeOwned` rather than `Deserialize<'de>` so the
/// result doesn't borrow from the response buffer, which is dropped right
/// after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that speaks JSON, the auth API's only format.
///
/// ```rust
/// use otpgate_protocol::{Codec, JsonCodec, ResponseHeader};
///
/// let codec = JsonCodec;
/// let header: ResponseHeader = codec
///     .decode(br#"{"success": false, "message": "nope", "error_code": "INVALID_OTP"}"#)
///     .unwrap();
/// assert!(!header.success);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionId, SessionRequest};

    #[test]
    fn test_encode_session_request() {
        let body = JsonCodec
            .encode(&SessionRequest {
                session_id: SessionId::new("s-1"),
            })
            .unwrap();
        assert_eq!(body, br#"{"session_id":"s-1"}"#);
    }

    #[test]
    fn test_decode_malformed_returns_decode_error() {
        let result: Result<SessionRequest, _> = JsonCodec.decode(b"{oops");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_truncated_returns_error() {
        let result: Result<SessionRequest, _> = JsonCodec.decode(br#"{"session_id":"#);
        assert!(result.is_err());
    }
}
