//! Adaptive OTP status poller for otpgate.
//!
//! While a session is bound, the poller repeatedly fetches the server's
//! OTP status and picks the next delay from the previous answer: the
//! closer the code is to expiring, the faster it polls. The latest
//! status, its urgency and the poller's phase are published on a
//! `tokio::sync::watch` channel for a UI (or anything else) to follow.
//!
//! # Cadence
//!
//! | last status                 | next fetch in |
//! |-----------------------------|---------------|
//! | none, or `otp_active` false | 5 s           |
//! | `remaining_seconds ≤ 60`    | 0.5 s         |
//! | `remaining_seconds ≤ 180`   | 1 s           |
//! | otherwise                   | 2 s           |
//!
//! Independently of the table, two fetches never start less than
//! [`PollerConfig::min_fetch_gap`] apart, and never overlap.
//!
//! # Integration
//!
//! ```ignore
//! let poller = OtpPoller::spawn(manager.clone(), PollerConfig::default());
//! poller.set_session(manager.session_id());
//! let mut view = poller.subscribe();
//! while view.changed().await.is_ok() {
//!     render(&view.borrow());
//! }
//! ```

mod poller;

pub use poller::{OtpPoller, PollerHandle};

use std::future::Future;
use std::time::Duration;

use otpgate_protocol::{Failure, OtpStatus, SessionId};
use otpgate_session::SessionManager;
use otpgate_transport::Transport;
use tracing::warn;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Delays and thresholds for the polling cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay when there is no active OTP. Default: 5 s.
    pub inactive_delay: Duration,
    /// At or below this many seconds left, poll with `urgent_delay`.
    pub urgent_threshold_secs: i64,
    /// Default: 500 ms.
    pub urgent_delay: Duration,
    /// At or below this many seconds left, poll with `warning_delay`.
    pub warning_threshold_secs: i64,
    /// Default: 1 s.
    pub warning_delay: Duration,
    /// Delay while plenty of time is left. Default: 2 s.
    pub normal_delay: Duration,
    /// Minimum time between the starts of two fetches. Default: 1 s.
    pub min_fetch_gap: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            inactive_delay: Duration::from_millis(5_000),
            urgent_threshold_secs: 60,
            urgent_delay: Duration::from_millis(500),
            warning_threshold_secs: 180,
            warning_delay: Duration::from_millis(1_000),
            normal_delay: Duration::from_millis(2_000),
            min_fetch_gap: Duration::from_millis(1_000),
        }
    }
}

impl PollerConfig {
    /// Shortest delay accepted anywhere in the table.
    pub const MIN_DELAY: Duration = Duration::from_millis(100);

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`OtpPoller::spawn`]. Rules:
    /// - every delay is at least [`Self::MIN_DELAY`],
    /// - `urgent_threshold_secs` is forced ≤ `warning_threshold_secs`.
    pub fn validated(mut self) -> Self {
        for delay in [
            &mut self.inactive_delay,
            &mut self.urgent_delay,
            &mut self.warning_delay,
            &mut self.normal_delay,
            &mut self.min_fetch_gap,
        ] {
            if *delay < Self::MIN_DELAY {
                warn!(
                    delay_ms = delay.as_millis() as u64,
                    "poll delay below minimum, clamping"
                );
                *delay = Self::MIN_DELAY;
            }
        }
        if self.urgent_threshold_secs > self.warning_threshold_secs {
            warn!(
                urgent = self.urgent_threshold_secs,
                warning = self.warning_threshold_secs,
                "urgent threshold above warning threshold, lowering"
            );
            self.urgent_threshold_secs = self.warning_threshold_secs;
        }
        self
    }

    /// Delay before the next fetch, given the last fetched status.
    pub fn next_delay(&self, status: Option<&OtpStatus>) -> Duration {
        match status {
            Some(s) if s.otp_active => {
                if s.remaining_seconds <= self.urgent_threshold_secs {
                    self.urgent_delay
                } else if s.remaining_seconds <= self.warning_threshold_secs {
                    self.warning_delay
                } else {
                    self.normal_delay
                }
            }
            _ => self.inactive_delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Urgency
// ---------------------------------------------------------------------------

/// How pressing the remaining OTP lifetime is. Display only; whether a
/// code is still accepted is the server's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Urgency {
    Normal,
    Warning,
    Urgent,
    Critical,
    Expired,
}

impl Urgency {
    /// Classifies `remaining_seconds`: `≤0` expired, `≤30` critical,
    /// `≤60` urgent, `≤180` warning, otherwise normal.
    pub fn from_remaining(remaining_seconds: i64) -> Self {
        match remaining_seconds {
            i64::MIN..=0 => Self::Expired,
            1..=30 => Self::Critical,
            31..=60 => Self::Urgent,
            61..=180 => Self::Warning,
            _ => Self::Normal,
        }
    }
}

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

/// What the poller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerPhase {
    /// No session bound; nothing scheduled.
    #[default]
    Idle,
    /// A fetch is in flight.
    Fetching,
    /// Sleeping until the next fetch.
    Waiting { delay: Duration },
}

/// Everything the poller publishes after each step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollerView {
    pub session_id: Option<SessionId>,
    /// Latest status; `None` while no OTP was initiated or no session is bound.
    pub status: Option<OtpStatus>,
    pub urgency: Option<Urgency>,
    pub phase: PollerPhase,
    /// Completed fetches, successful or not, since the poller started.
    pub fetches: u64,
    /// The last fetch's failure, cleared by the next success.
    pub last_error: Option<Failure>,
}

// ---------------------------------------------------------------------------
// Status source
// ---------------------------------------------------------------------------

/// Where the poller gets OTP status from.
///
/// Implemented for [`SessionManager`]; tests plug in their own.
pub trait StatusSource: Send + Sync + 'static {
    /// Fetches the OTP status of `session_id`. `Ok(None)` means no OTP yet.
    fn fetch_status(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<OtpStatus>, Failure>> + Send;
}

impl<T: Transport> StatusSource for SessionManager<T> {
    async fn fetch_status(&self, session_id: &SessionId) -> Result<Option<OtpStatus>, Failure> {
        self.fetch_otp_status(session_id)
            .await
            .map(|reply| reply.data)
    }
}
