//! `AuthClient` builder and lifecycle.
//!
//! This is the entry point for embedding otpgate. It ties the layers
//! together: transport → session manager → OTP poller, and keeps the
//! poller bound to whatever session the manager currently holds.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use otpgate_poll::{OtpPoller, PollerConfig, PollerHandle, PollerView};
use otpgate_protocol::{SessionId, SessionState};
use otpgate_session::{SessionConfig, SessionEvent, SessionManager};
use otpgate_store::DurableStore;
use otpgate_transport::{HttpTransport, Transport, TransportError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::OtpgateError;

/// Builder for configuring an [`AuthClient`].
///
/// # Example
///
/// ```rust,ignore
/// use otpgate::prelude::*;
///
/// let client = AuthClient::builder()
///     .base_url("https://bank.example")
///     .store(DurableStore::new(FileStorage::new("session.json")))
///     .build()
///     .await?;
/// client.start().await;
/// ```
pub struct AuthClientBuilder {
    base_url: Option<String>,
    store: Option<DurableStore>,
    session_config: SessionConfig,
    poller_config: PollerConfig,
}

impl AuthClientBuilder {
    /// Creates a new builder with default settings and an in-memory store.
    pub fn new() -> Self {
        Self {
            base_url: None,
            store: None,
            session_config: SessionConfig::default(),
            poller_config: PollerConfig::default(),
        }
    }

    /// Sets the auth backend's base URL (scheme + host).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets where the session id is persisted between runs.
    pub fn store(mut self, store: DurableStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the OTP poller's cadence.
    pub fn poller_config(mut self, config: PollerConfig) -> Self {
        self.poller_config = config;
        self
    }

    /// Builds a client that talks HTTP to the configured base URL.
    ///
    /// Must run inside a Tokio runtime: the poller task is spawned here,
    /// idle until a session is bound.
    pub async fn build(self) -> Result<AuthClient<HttpTransport>, OtpgateError> {
        let base_url = match self.base_url.as_deref() {
            Some(raw) => Url::parse(raw).map_err(TransportError::from)?,
            None => return Err(OtpgateError::MissingBaseUrl),
        };
        let transport = HttpTransport::with_timeout(base_url, self.session_config.request_timeout)?;
        Ok(self.build_with_transport(transport).await)
    }

    /// Builds a client over any [`Transport`]. The base URL, if set, is
    /// ignored.
    pub async fn build_with_transport<T: Transport>(self, transport: T) -> AuthClient<T> {
        let store = self.store.unwrap_or_else(DurableStore::in_memory);
        let manager = SessionManager::new(transport, store, self.session_config);
        let poller = OtpPoller::spawn(manager.clone(), self.poller_config);

        AuthClient {
            manager,
            poller: Arc::new(poller),
            binder: Mutex::new(None),
        }
    }
}

impl Default for AuthClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One session manager plus one OTP poller, kept in step.
///
/// Call [`start`](Self::start) to restore a persisted session and begin
/// background work, and [`shutdown`](Self::shutdown) to stop it. Dropping
/// the client also stops everything, just without waiting.
pub struct AuthClient<T: Transport> {
    manager: SessionManager<T>,
    poller: Arc<PollerHandle>,
    binder: Mutex<Option<JoinHandle<()>>>,
}

impl AuthClient<HttpTransport> {
    /// Creates a new builder.
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::new()
    }
}

impl<T: Transport> AuthClient<T> {
    /// Starts following session events, then starts the session manager
    /// (restoring and validating a persisted session if there is one).
    ///
    /// Calling it again only re-runs the manager's startup validation.
    pub async fn start(&self) {
        {
            let mut slot = lock(&self.binder);
            if slot.is_none() {
                let events = self.manager.subscribe();
                *slot = Some(tokio::spawn(bind_poller(
                    self.manager.clone(),
                    Arc::clone(&self.poller),
                    events,
                )));
            }
        }

        self.manager.start().await;
        self.poller.set_session(poll_target(&self.manager));
        info!(session_id = ?self.manager.session_id(), "auth client started");
    }

    /// Stops the poller, the binding task and session maintenance, and
    /// waits for each. Safe to call more than once.
    pub async fn shutdown(&self) {
        let binder = lock(&self.binder).take();
        if let Some(binder) = binder {
            binder.abort();
            let _ = binder.await;
        }
        self.poller.shutdown().await;
        self.manager.shutdown().await;
        info!("auth client stopped");
    }

    /// The session manager: every auth operation lives here.
    pub fn session(&self) -> &SessionManager<T> {
        &self.manager
    }

    pub fn poller(&self) -> &PollerHandle {
        &self.poller
    }

    /// Follows the OTP poller's published view.
    pub fn otp_view(&self) -> watch::Receiver<PollerView> {
        self.poller.subscribe()
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.manager.subscribe()
    }
}

impl<T: Transport> Drop for AuthClient<T> {
    fn drop(&mut self) {
        let binder = self
            .binder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(binder) = binder {
            binder.abort();
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Poller binding
// ---------------------------------------------------------------------------

/// What a session event means for the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Re-read the manager's session and bind to it.
    Follow,
    /// The session is gone or done; stop polling.
    Unbind,
    /// Nothing to do.
    Keep,
}

impl Binding {
    pub(crate) fn for_event(event: &SessionEvent) -> Self {
        match event {
            SessionEvent::Initialized { .. }
            | SessionEvent::SessionCreated { .. }
            | SessionEvent::SessionRestored { .. }
            | SessionEvent::SessionRestarted { .. }
            | SessionEvent::SessionUpdated { .. }
            | SessionEvent::ContactVerified { .. }
            | SessionEvent::OtpInitiated { .. }
            | SessionEvent::OtpResent { .. } => Self::Follow,
            SessionEvent::OtpVerified
            | SessionEvent::AuthenticationSuccess { .. }
            | SessionEvent::AuthenticationRequired
            | SessionEvent::AuthCleared => Self::Unbind,
            SessionEvent::ConnectionRestored
            | SessionEvent::ConnectionLost
            | SessionEvent::RetryAttempt { .. } => Self::Keep,
        }
    }
}

/// The session the poller should watch: the current one, unless it has
/// reached a state it can never leave.
fn poll_target<T: Transport>(manager: &SessionManager<T>) -> Option<SessionId> {
    let snapshot = manager.snapshot();
    if snapshot.state.is_some_and(SessionState::is_terminal) {
        return None;
    }
    snapshot.session_id
}

async fn bind_poller<T: Transport>(
    manager: SessionManager<T>,
    poller: Arc<PollerHandle>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => match Binding::for_event(&event) {
                Binding::Follow => poller.set_session(poll_target(&manager)),
                Binding::Unbind => poller.set_session(None),
                Binding::Keep => {}
            },
            Err(RecvError::Lagged(missed)) => {
                debug!(missed, "poller binding lagged, resyncing");
                poller.set_session(poll_target(&manager));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgate_protocol::ErrorCode;

    #[test]
    fn test_binding_follows_session_progress() {
        let id = SessionId::new("s-1");
        for event in [
            SessionEvent::Initialized { session_id: None },
            SessionEvent::SessionCreated { session_id: id.clone() },
            SessionEvent::SessionRestored { session_id: id.clone() },
            SessionEvent::SessionRestarted { session_id: id },
        ] {
            assert_eq!(Binding::for_event(&event), Binding::Follow, "{}", event.name());
        }
    }

    #[test]
    fn test_binding_unbinds_when_session_ends() {
        for event in [
            SessionEvent::OtpVerified,
            SessionEvent::AuthenticationRequired,
            SessionEvent::AuthCleared,
        ] {
            assert_eq!(Binding::for_event(&event), Binding::Unbind, "{}", event.name());
        }
    }

    #[test]
    fn test_binding_ignores_connectivity_and_retries() {
        for event in [
            SessionEvent::ConnectionLost,
            SessionEvent::ConnectionRestored,
            SessionEvent::RetryAttempt {
                operation: "initiate_otp",
                attempt: 1,
                code: ErrorCode::ServiceError,
            },
        ] {
            assert_eq!(Binding::for_event(&event), Binding::Keep, "{}", event.name());
        }
    }
}
