//! Domain types shared by every layer: session identity, the session state
//! machine, and the server's read-only OTP status projection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An opaque, server-issued session identifier.
///
/// Newtype over `String` so a session id can't be confused with an email,
/// a phone number or an OTP. `#[serde(transparent)]` keeps it a bare
/// string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a session is in the verification flow.
///
/// The server owns this; the client mirrors it. Transitions only go
/// forward:
///
/// ```text
/// ContactVerification → OtpVerification → Authenticated
///          │                   │
///          └───────────────────┴──────→ Locked | Expired
/// ```
///
/// Going back requires a restart, which throws the session away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    ContactVerification,
    OtpVerification,
    Authenticated,
    Locked,
    Expired,
}

impl SessionState {
    /// `true` for states the session can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Authenticated | Self::Locked | Self::Expired)
    }

    fn rank(self) -> u8 {
        match self {
            Self::ContactVerification => 0,
            Self::OtpVerification => 1,
            Self::Authenticated | Self::Locked | Self::Expired => 2,
        }
    }

    /// Returns `true` if moving from `self` to `target` goes forward (or
    /// stays put). Terminal states accept no change.
    pub fn can_advance_to(self, target: Self) -> bool {
        if self == target {
            return true;
        }
        !self.is_terminal() && target.rank() > self.rank()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContactVerification => "contact_verification",
            Self::OtpVerification => "otp_verification",
            Self::Authenticated => "authenticated",
            Self::Locked => "locked",
            Self::Expired => "expired",
        })
    }
}

/// Channel the OTP is delivered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpMethod {
    Email,
    Sms,
}

impl fmt::Display for OtpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Sms => "sms",
        })
    }
}

// ---------------------------------------------------------------------------
// AttemptCounter
// ---------------------------------------------------------------------------

/// A bounded "used out of max" counter.
///
/// Only `used` and `max` are stored; `remaining` is always derived, so
/// `remaining == max - used` and `remaining >= 0` can't drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptCounter {
    used: u32,
    max: u32,
}

impl AttemptCounter {
    /// `used` is clamped to `max`.
    pub fn new(used: u32, max: u32) -> Self {
        Self {
            used: used.min(max),
            max,
        }
    }

    /// Builds a counter from the `remaining`/`max` pair most responses carry.
    pub fn from_remaining(remaining: u32, max: u32) -> Self {
        Self::new(max.saturating_sub(remaining), max)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

// ---------------------------------------------------------------------------
// Session projection
// ---------------------------------------------------------------------------

fn default_max_contact_attempts() -> u32 {
    3
}

/// The server's view of a session, as returned by the status endpoint.
///
/// Unknown fields (including the server's own `remaining_contact_attempts`)
/// are ignored; use [`Session::contact_attempts`] for the derived counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub state: SessionState,
    #[serde(default)]
    pub contact_verified: bool,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub contact_attempts: u32,
    #[serde(default = "default_max_contact_attempts")]
    pub max_contact_attempts: u32,
    #[serde(default)]
    pub preferred_otp_method: Option<OtpMethod>,
    #[serde(default)]
    pub customer_data: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "last_activity")]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contact_verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub otp_initiated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub otp_resent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn contact_attempts(&self) -> AttemptCounter {
        AttemptCounter::new(self.contact_attempts, self.max_contact_attempts)
    }
}

// ---------------------------------------------------------------------------
// OTP status projection
// ---------------------------------------------------------------------------

/// The server's classification of an OTP's remaining lifetime.
///
/// Display only; the client never derives it itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPhase {
    #[default]
    NotInitiated,
    Active,
    ActiveWarning,
    ExpiringSoon,
    Expired,
}

/// Read-only snapshot of the current OTP, fetched from the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpStatus {
    /// Whether a code is currently valid. The only field that decides
    /// acceptance.
    pub otp_active: bool,
    /// Whether a code was ever sent in this session.
    pub otp_initiated: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
    pub remaining_minutes: i64,
    pub method: Option<OtpMethod>,
    pub masked_contact: Option<String>,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub remaining_attempts: u32,
    /// 0–100, how much of the expiry window has elapsed.
    pub progress_percentage: f64,
    pub status: OtpPhase,
}

impl OtpStatus {
    pub fn attempts(&self) -> AttemptCounter {
        AttemptCounter::new(self.attempts_used, self.max_attempts)
    }
}
