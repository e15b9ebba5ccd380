//! Errors from misusing the session manager's lifecycle.
//!
//! Auth outcomes are reported as [`Failure`](otpgate_protocol::Failure);
//! this type only covers the manager's own plumbing.

/// Errors from the session manager's lifecycle API.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The maintenance task was never started or has been shut down.
    #[error("session maintenance is not running")]
    NotRunning,

    /// Host signals are arriving faster than the maintenance task drains them.
    #[error("host signal queue is full")]
    SignalQueueFull,
}
