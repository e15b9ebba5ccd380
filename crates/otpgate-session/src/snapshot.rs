//! The client's local mirror of the server-owned session.
//!
//! The server is the source of truth; this mirror exists so callers can
//! render the flow without a round trip. It only ever moves forward: a
//! state can't regress and a milestone timestamp, once set, stays put.

use chrono::{DateTime, Utc};
use otpgate_protocol::{AttemptCounter, OtpMethod, Session, SessionId, SessionState};

/// Contact attempts allowed when the server hasn't said otherwise.
pub const DEFAULT_MAX_CONTACT_ATTEMPTS: u32 = 3;

/// A one-shot point in the session's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Created,
    Locked,
    ContactVerified,
    OtpInitiated,
    OtpResent,
    Authenticated,
}

/// When each milestone happened. All set-once except `last_activity_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub contact_verified_at: Option<DateTime<Utc>>,
    pub otp_initiated_at: Option<DateTime<Utc>>,
    pub otp_resent_at: Option<DateTime<Utc>>,
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    fn slot(&mut self, milestone: Milestone) -> &mut Option<DateTime<Utc>> {
        match milestone {
            Milestone::Created => &mut self.created_at,
            Milestone::Locked => &mut self.locked_at,
            Milestone::ContactVerified => &mut self.contact_verified_at,
            Milestone::OtpInitiated => &mut self.otp_initiated_at,
            Milestone::OtpResent => &mut self.otp_resent_at,
            Milestone::Authenticated => &mut self.authenticated_at,
        }
    }

    /// Records `milestone` at `at` unless it was already recorded.
    /// Returns `true` if the slot was empty.
    pub fn mark(&mut self, milestone: Milestone, at: DateTime<Utc>) -> bool {
        let slot = self.slot(milestone);
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        true
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_activity_at = Some(at);
    }

    pub fn get(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::Created => self.created_at,
            Milestone::Locked => self.locked_at,
            Milestone::ContactVerified => self.contact_verified_at,
            Milestone::OtpInitiated => self.otp_initiated_at,
            Milestone::OtpResent => self.otp_resent_at,
            Milestone::Authenticated => self.authenticated_at,
        }
    }
}

/// Everything the client knows locally about the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub state: Option<SessionState>,
    pub contact_attempts: AttemptCounter,
    pub otp_method: Option<OtpMethod>,
    pub masked_contact: Option<String>,
    pub customer_name: Option<String>,
    /// Populated only after a successful OTP verification.
    pub customer_data: Option<serde_json::Value>,
    pub timestamps: Timestamps,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            state: None,
            contact_attempts: AttemptCounter::new(0, DEFAULT_MAX_CONTACT_ATTEMPTS),
            otp_method: None,
            masked_contact: None,
            customer_name: None,
            customer_data: None,
            timestamps: Timestamps::default(),
        }
    }
}

impl SessionSnapshot {
    /// A fresh mirror for a session the server just issued.
    pub fn created(session_id: SessionId, max_attempts: u32, at: DateTime<Utc>) -> Self {
        let mut snapshot = Self {
            session_id: Some(session_id),
            state: Some(SessionState::ContactVerification),
            contact_attempts: AttemptCounter::new(0, max_attempts),
            ..Self::default()
        };
        snapshot.timestamps.mark(Milestone::Created, at);
        snapshot.timestamps.touch(at);
        snapshot
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == Some(SessionState::Authenticated)
    }

    /// Moves to `target` if that is a forward step. Returns whether the
    /// state is now `target`.
    pub fn advance(&mut self, target: SessionState) -> bool {
        match self.state {
            None => {
                self.state = Some(target);
                true
            }
            Some(current) if current.can_advance_to(target) => {
                self.state = Some(target);
                true
            }
            Some(current) => {
                tracing::debug!(%current, %target, "ignoring backward state transition");
                false
            }
        }
    }

    /// Merges the server's projection into the mirror.
    ///
    /// Counters and method are replaced; state only moves forward;
    /// timestamps fill gaps but never overwrite.
    pub fn absorb(&mut self, session: &Session) {
        self.session_id = Some(session.session_id.clone());
        self.advance(session.state);
        self.contact_attempts = session.contact_attempts();
        if session.preferred_otp_method.is_some() {
            self.otp_method = session.preferred_otp_method;
        }
        if session.customer_data.is_some() {
            self.customer_data = session.customer_data.clone();
        }

        let remote = [
            (Milestone::Created, session.created_at),
            (Milestone::Locked, session.locked_at),
            (Milestone::ContactVerified, session.contact_verified_at),
            (Milestone::OtpInitiated, session.otp_initiated_at),
            (Milestone::OtpResent, session.otp_resent_at),
            (Milestone::Authenticated, session.authenticated_at),
        ];
        for (milestone, at) in remote {
            if let Some(at) = at {
                self.timestamps.mark(milestone, at);
            }
        }
        if let Some(at) = session.last_activity_at {
            self.timestamps.touch(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn projection(state: SessionState) -> Session {
        Session {
            session_id: SessionId::new("s-1"),
            state,
            contact_verified: false,
            authenticated: false,
            contact_attempts: 1,
            max_contact_attempts: 3,
            preferred_otp_method: Some(OtpMethod::Sms),
            customer_data: None,
            created_at: Some(at(100)),
            last_activity_at: Some(at(200)),
            locked_at: None,
            contact_verified_at: None,
            otp_initiated_at: None,
            otp_resent_at: None,
            authenticated_at: None,
        }
    }

    #[test]
    fn test_mark_is_set_once() {
        let mut ts = Timestamps::default();
        assert!(ts.mark(Milestone::OtpInitiated, at(1)));
        assert!(!ts.mark(Milestone::OtpInitiated, at(2)));
        assert_eq!(ts.get(Milestone::OtpInitiated), Some(at(1)));
    }

    #[test]
    fn test_touch_overwrites() {
        let mut ts = Timestamps::default();
        ts.touch(at(1));
        ts.touch(at(2));
        assert_eq!(ts.last_activity_at, Some(at(2)));
    }

    #[test]
    fn test_advance_refuses_backward() {
        let mut s = SessionSnapshot::created(SessionId::new("s"), 3, at(0));
        assert!(s.advance(SessionState::OtpVerification));
        assert!(!s.advance(SessionState::ContactVerification));
        assert_eq!(s.state, Some(SessionState::OtpVerification));
        assert!(s.advance(SessionState::Authenticated));
        assert!(!s.advance(SessionState::Locked));
        assert!(s.is_authenticated());
    }

    #[test]
    fn test_absorb_merges_projection() {
        let mut s = SessionSnapshot::created(SessionId::new("s-1"), 3, at(50));
        s.absorb(&projection(SessionState::OtpVerification));

        assert_eq!(s.state, Some(SessionState::OtpVerification));
        assert_eq!(s.contact_attempts.used(), 1);
        assert_eq!(s.contact_attempts.remaining(), 2);
        assert_eq!(s.otp_method, Some(OtpMethod::Sms));
        // local created_at wins, activity follows the server
        assert_eq!(s.timestamps.created_at, Some(at(50)));
        assert_eq!(s.timestamps.last_activity_at, Some(at(200)));
    }

    #[test]
    fn test_absorb_does_not_regress_state() {
        let mut s = SessionSnapshot::default();
        s.advance(SessionState::Authenticated);
        s.absorb(&projection(SessionState::ContactVerification));
        assert_eq!(s.state, Some(SessionState::Authenticated));
    }
}
