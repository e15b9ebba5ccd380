//! Unified error type for otpgate.

use otpgate_protocol::{Failure, ProtocolError};
use otpgate_session::SessionError;
use otpgate_store::StoreError;
use otpgate_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `otpgate` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum OtpgateError {
    /// The server said no, or could not be reached after retries.
    #[error(transparent)]
    Auth(#[from] Failure),

    /// A transport-level error (setup, bad base URL).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A storage backend error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session manager's lifecycle was misused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// [`AuthClientBuilder::build`](crate::AuthClientBuilder::build) was
    /// called without a base URL.
    #[error("no base URL configured")]
    MissingBaseUrl,
}

impl OtpgateError {
    /// The auth failure behind this error, if that's what it is.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Auth(failure) => Some(failure),
            _ => None,
        }
    }
}
