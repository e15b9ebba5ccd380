//! # otpgate
//!
//! Client-side session and OTP lifecycle manager for multi-step identity
//! verification.
//!
//! otpgate drives a remote auth backend through create session → verify
//! contact → send OTP → verify OTP. It persists the session id across
//! restarts, retries technical failures with backoff, re-validates the
//! session in the background and polls the OTP's remaining lifetime at a
//! rate that speeds up as expiry approaches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use otpgate::prelude::*;
//!
//! # async fn run() -> Result<(), OtpgateError> {
//! let client = AuthClient::builder()
//!     .base_url("https://bank.example")
//!     .build()
//!     .await?;
//! client.start().await;
//!
//! let session = client.session();
//! session.create_session().await?;
//! session.verify_contact(Some("jane@example.com"), None, Some(OtpMethod::Email)).await?;
//! session.initiate_otp().await?;
//! session.verify_otp("123456").await?;
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{AuthClient, AuthClientBuilder};
pub use error::OtpgateError;

pub use otpgate_poll as poll;
pub use otpgate_protocol as protocol;
pub use otpgate_retry as retry;
pub use otpgate_session as session;
pub use otpgate_store as store;
pub use otpgate_transport as transport;

/// Everything needed to drive an auth flow.
pub mod prelude {
    pub use crate::{AuthClient, AuthClientBuilder, OtpgateError};
    pub use otpgate_poll::{PollerConfig, PollerPhase, PollerView, Urgency};
    pub use otpgate_protocol::{
        ErrorCode, Failure, FailureKind, OtpMethod, OtpStatus, SessionId, SessionState,
    };
    pub use otpgate_retry::RetryPolicy;
    pub use otpgate_session::{
        HostSignal, Reply, SessionConfig, SessionEvent, SessionManager, SessionSnapshot,
    };
    pub use otpgate_store::{DurableStore, FileStorage, MemoryStorage};
    pub use otpgate_transport::{HttpTransport, Transport};
}
