//! In-process event bus for session lifecycle notifications.
//!
//! Built on `tokio::sync::broadcast`: every subscriber owns its own
//! receiver, so a slow or crashed consumer can't block the manager or
//! starve other subscribers. Emitting with nobody listening is fine.

use otpgate_protocol::{ErrorCode, OtpMethod, Session, SessionId};
use tokio::sync::broadcast;

/// Something that happened to the session, for consumers to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Startup finished (restore + first validation).
    Initialized { session_id: Option<SessionId> },
    SessionCreated { session_id: SessionId },
    /// A status fetch refreshed the local mirror.
    SessionUpdated { session: Box<Session> },
    /// A persisted session id was picked up at startup.
    SessionRestored { session_id: SessionId },
    ContactVerified {
        customer_name: Option<String>,
        otp_method: Option<OtpMethod>,
    },
    OtpInitiated {
        method: Option<OtpMethod>,
        masked_contact: Option<String>,
    },
    OtpVerified,
    OtpResent {
        method: Option<OtpMethod>,
        masked_contact: Option<String>,
    },
    AuthenticationSuccess {
        customer_data: Option<serde_json::Value>,
    },
    /// The server answered 401; local session state was dropped.
    AuthenticationRequired,
    /// Local session state was dropped (logout, expiry, restart).
    AuthCleared,
    SessionRestarted { session_id: SessionId },
    ConnectionRestored,
    ConnectionLost,
    /// A technical failure is about to be retried.
    RetryAttempt {
        operation: &'static str,
        attempt: u32,
        code: ErrorCode,
    },
}

impl SessionEvent {
    /// Stable camelCase name, handy for logging and for UI bindings.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::SessionCreated { .. } => "sessionCreated",
            Self::SessionUpdated { .. } => "sessionUpdated",
            Self::SessionRestored { .. } => "sessionRestored",
            Self::ContactVerified { .. } => "contactVerified",
            Self::OtpInitiated { .. } => "otpInitiated",
            Self::OtpVerified => "otpVerified",
            Self::OtpResent { .. } => "otpResent",
            Self::AuthenticationSuccess { .. } => "authenticationSuccess",
            Self::AuthenticationRequired => "authenticationRequired",
            Self::AuthCleared => "authCleared",
            Self::SessionRestarted { .. } => "sessionRestarted",
            Self::ConnectionRestored => "connectionRestored",
            Self::ConnectionLost => "connectionLost",
            Self::RetryAttempt { .. } => "retryAttempt",
        }
    }
}

/// Publish/subscribe channel for [`SessionEvent`]s. Clones share the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// `capacity` is how many events a lagging subscriber may fall behind
    /// before it starts missing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Starts receiving events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Delivers `event` to every current subscriber.
    pub fn emit(&self, event: SessionEvent) {
        tracing::trace!(event = event.name(), "emitting session event");
        // Err only means nobody is subscribed right now.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(SessionEvent::OtpVerified);

        assert_eq!(a.recv().await.unwrap(), SessionEvent::OtpVerified);
        assert_eq!(b.recv().await.unwrap(), SessionEvent::OtpVerified);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(SessionEvent::AuthCleared);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_others() {
        let bus = EventBus::new(8);
        let dropped = bus.subscribe();
        let mut alive = bus.subscribe();
        drop(dropped);

        bus.emit(SessionEvent::ConnectionLost);
        assert_eq!(alive.recv().await.unwrap(), SessionEvent::ConnectionLost);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::OtpVerified.name(), "otpVerified");
        assert_eq!(
            SessionEvent::RetryAttempt {
                operation: "create_session",
                attempt: 1,
                code: ErrorCode::NetworkError,
            }
            .name(),
            "retryAttempt"
        );
    }
}
