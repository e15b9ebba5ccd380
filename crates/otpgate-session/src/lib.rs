//! Session layer for otpgate.
//!
//! Drives the client side of a multi-step identity verification:
//! create a session, verify a contact channel, dispatch and verify a
//! one-time passcode. Along the way it:
//!
//! - persists the session id so a restart picks up where it left off,
//! - classifies every outcome into a [`Failure`](otpgate_protocol::Failure)
//!   and retries the technical ones with backoff,
//! - keeps a local [`SessionSnapshot`] of the server's session,
//! - re-validates the session in the background,
//! - publishes [`SessionEvent`]s on an [`EventBus`].
//!
//! # Architecture
//!
//! ```text
//! caller ──→ SessionManager ──→ with_retry ──→ Transport
//!                 │                               │
//!                 │◄──── Reply<T> | Failure ◄─────┘ (normalized once)
//!                 ├──→ DurableStore (session id)
//!                 └──→ EventBus ──→ subscribers
//! ```
//!
//! # Example
//!
//! ```ignore
//! let manager = SessionManager::new(transport, DurableStore::in_memory(), SessionConfig::default());
//! let mut events = manager.subscribe();
//! manager.start().await;
//!
//! manager.create_session().await?;
//! manager.verify_contact(Some("jane@example.com"), None, Some(OtpMethod::Email)).await?;
//! manager.initiate_otp().await?;
//! manager.verify_otp("123456").await?;
//! ```

mod config;
mod error;
mod events;
mod exchange;
mod maintenance;
mod manager;
mod snapshot;
pub mod validation;

pub use config::{SESSION_ID_KEY, SessionConfig};
pub use error::SessionError;
pub use events::{EventBus, SessionEvent};
pub use exchange::Reply;
pub use manager::{HostSignal, SessionManager};
pub use snapshot::{DEFAULT_MAX_CONTACT_ATTEMPTS, Milestone, SessionSnapshot, Timestamps};
