//! Wire protocol for the otpgate auth API.
//!
//! This crate defines what the client and the auth backend say to each
//! other:
//!
//! - **Types** ([`SessionId`], [`SessionState`], [`Session`], [`OtpStatus`])
//!   are the session and OTP projections the server owns.
//! - **Messages** ([`VerifyContactRequest`], [`ResponseHeader`], ...):
//!   per-endpoint request bodies and success payloads.
//! - **Error codes** ([`ErrorCode`]): the enumerated `error_code` values
//!   and their customer-facing text.
//! - **Failure** ([`Failure`]): the single tagged failure type every
//!   operation resolves to, classified once at the response boundary.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, types out.
//!
//! # Architecture
//!
//! ```text
//! Transport (status + bytes) → Protocol (header, payload, Failure) → Session manager
//! ```

mod code;
mod codec;
mod error;
mod failure;
mod messages;
mod types;

pub use code::ErrorCode;
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use failure::{Failure, FailureKind};
pub use messages::{
    Authenticated, CREATE_SESSION_PATH, ContactVerified, CreateSessionRequest,
    INITIATE_OTP_PATH, OtpDispatched, OtpStatusPayload, RESEND_OTP_PATH,
    ResponseHeader, SessionCreated, SessionRequest, VERIFY_CONTACT_PATH,
    VERIFY_OTP_PATH, VerifyContactRequest, VerifyOtpRequest, otp_status_path,
    session_status_path,
};
pub use types::{
    AttemptCounter, OtpMethod, OtpPhase, OtpStatus, Session, SessionId,
    SessionState,
};
