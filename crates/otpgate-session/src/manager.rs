//! The session manager: owns the auth state machine for one client.
//!
//! It's responsible for:
//! - Creating a session and remembering its id across restarts
//! - Driving contact verification, OTP dispatch and OTP verification
//! - Keeping a local mirror of the server's session in step
//! - Re-validating the session in the background
//! - Telling subscribers what happened through the [`EventBus`]
//!
//! # Lifecycle
//!
//! ```text
//! create_session() ──→ verify_contact() ──→ initiate_otp() ──→ verify_otp()
//!        │                    │                  │  ↺ resend_otp()    │
//!        ▼                    ▼                  ▼                    ▼
//! [ContactVerification] [OtpVerification]                     [Authenticated]
//!
//!   any step ──(SESSION_LOCKED / MAX_ATTEMPTS_EXCEEDED)──→ [Locked]
//!   restart_session() throws the session away and starts over
//! ```
//!
//! # Concurrency note
//!
//! Operations take `&self` and may run concurrently; the last response
//! wins for locally cached fields, but only responses for the current
//! session count. The mirror sits behind a `std::sync::Mutex` that is
//! never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use otpgate_protocol::{
    AttemptCounter, Authenticated, CREATE_SESSION_PATH, ContactVerified,
    CreateSessionRequest, ErrorCode, Failure, INITIATE_OTP_PATH, JsonCodec,
    OtpDispatched, OtpMethod, OtpStatus, OtpStatusPayload, RESEND_OTP_PATH, Session,
    SessionCreated, SessionId, SessionRequest, SessionState, VERIFY_CONTACT_PATH,
    VERIFY_OTP_PATH, VerifyContactRequest, VerifyOtpRequest, otp_status_path,
    session_status_path,
};
use otpgate_retry::with_retry;
use otpgate_store::DurableStore;
use otpgate_transport::{Request, Transport};
use tokio::sync::broadcast;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::exchange::{Scope, technical};
use crate::maintenance::{self, MaintenanceHandle};
use crate::snapshot::{DEFAULT_MAX_CONTACT_ATTEMPTS, Milestone};
use crate::validation::{Contact, validate_contact, validate_otp};
use crate::{
    EventBus, Reply, SESSION_ID_KEY, SessionConfig, SessionError, SessionEvent,
    SessionSnapshot,
};

/// Something the host environment noticed that may affect the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// The app came back to the foreground.
    VisibilityRegained,
    Online,
    Offline,
}

pub(crate) struct Inner<T> {
    pub(crate) transport: T,
    pub(crate) codec: JsonCodec,
    pub(crate) store: DurableStore,
    pub(crate) events: EventBus,
    pub(crate) config: SessionConfig,
    local: Mutex<SessionSnapshot>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

/// Client-side manager for one authentication session.
///
/// Cheap to clone; clones share the same session.
pub struct SessionManager<T: Transport> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for SessionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> SessionManager<T> {
    /// Creates a manager, picking up any session id persisted in `store`.
    ///
    /// Nothing is sent yet; call [`start`](Self::start) to validate the
    /// restored session and begin background maintenance. Subscribe before
    /// starting to see the startup events.
    pub fn new(transport: T, store: DurableStore, config: SessionConfig) -> Self {
        let config = config.validated();
        let restored: Option<SessionId> = store.get(SESSION_ID_KEY);
        if let Some(id) = &restored {
            debug!(session_id = %id, "found persisted session id");
        }
        let local = SessionSnapshot {
            session_id: restored,
            ..SessionSnapshot::default()
        };
        let events = EventBus::new(config.event_capacity);

        Self {
            inner: Arc::new(Inner {
                transport,
                codec: JsonCodec,
                store,
                events,
                config,
                local: Mutex::new(local),
                maintenance: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn upgrade(inner: &Weak<Inner<T>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Validates a restored session (status check only, never a new
    /// contact verification), emits `SessionRestored`/`Initialized`, then
    /// spawns the maintenance task if it isn't running yet.
    pub async fn start(&self) {
        if let Some(id) = self.session_id() {
            info!(session_id = %id, "restoring session");
            self.inner.events.emit(SessionEvent::SessionRestored { session_id: id });
            self.validate_session().await;
        }
        self.inner.events.emit(SessionEvent::Initialized {
            session_id: self.session_id(),
        });

        let mut slot = lock(&self.inner.maintenance);
        if slot.is_none() {
            *slot = Some(maintenance::spawn(
                Arc::downgrade(&self.inner),
                self.inner.config.revalidate_interval,
            ));
        }
    }

    /// Stops the maintenance task. Only the first call does anything.
    pub async fn shutdown(&self) {
        let handle = lock(&self.inner.maintenance).take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("session manager shut down");
        }
    }

    pub fn maintenance_running(&self) -> bool {
        lock(&self.inner.maintenance).is_some()
    }

    /// Forwards a host signal to the maintenance task.
    pub fn signal(&self, signal: HostSignal) -> Result<(), SessionError> {
        let slot = lock(&self.inner.maintenance);
        let handle = slot.as_ref().ok_or(SessionError::NotRunning)?;
        handle.signals.try_send(signal).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::SignalQueueFull,
            TrySendError::Closed(_) => SessionError::NotRunning,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn session_id(&self) -> Option<SessionId> {
        lock(&self.inner.local).session_id.clone()
    }

    /// A copy of the local mirror.
    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.inner.local).clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Asks the server for a new session and makes it the current one.
    ///
    /// If the current session changes while the request is in flight (a
    /// logout, another create), the new session is returned but not adopted.
    pub async fn create_session(&self) -> Result<Reply<SessionCreated>, Failure> {
        let body = CreateSessionRequest {
            ip_address: self.inner.config.ip_address.clone(),
            user_agent: self.inner.config.user_agent.clone(),
        };
        let request = self.post(CREATE_SESSION_PATH, &body)?;
        let replacing = self.session_id();
        let scope = Scope::Create(replacing.as_ref());
        let reply = self
            .retrying("create_session", |this| {
                this.exchange::<SessionCreated>(request.clone(), scope)
            })
            .await?;
        reply.data.validate().map_err(|e| {
            warn!(error = %e, "create session answered without a usable id");
            technical(ErrorCode::NetworkError, None)
        })?;

        let id = reply.data.session_id.clone();
        let max = reply.data.max_attempts.unwrap_or(DEFAULT_MAX_CONTACT_ATTEMPTS);
        let now = Utc::now();
        let adopted = self.update_current(scope.expected(), |local| {
            *local = SessionSnapshot::created(id.clone(), max, now);
            self.persist_session_id(&id);
        });
        if adopted.is_none() {
            debug!(session_id = %id, "session changed while creating, not adopting");
            return Ok(reply);
        }

        info!(session_id = %id, "session created");
        self.inner.events.emit(SessionEvent::SessionCreated { session_id: id });
        Ok(reply)
    }

    /// Identifies the customer by exactly one of `email` or `phone`.
    ///
    /// Input is checked locally first; a malformed contact never reaches
    /// the server. The contact attempt counter follows every server answer.
    pub async fn verify_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        preferred_otp_method: Option<OtpMethod>,
    ) -> Result<Reply<ContactVerified>, Failure> {
        let session_id = self.require_session()?;
        let (email, phone) = match validate_contact(email, phone)? {
            Contact::Email(email) => (Some(email), None),
            Contact::Phone(phone) => (None, Some(phone)),
        };
        let body = VerifyContactRequest {
            session_id: session_id.clone(),
            email,
            phone,
            preferred_otp_method,
        };
        let request = self.post(VERIFY_CONTACT_PATH, &body)?;
        let scope = Scope::Session(&session_id);
        let result = self
            .retrying("verify_contact", |this| {
                this.exchange::<ContactVerified>(request.clone(), scope)
            })
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(failure) => {
                self.count_contact_failure(&session_id, &failure);
                return Err(failure);
            }
        };

        let method = reply.data.otp_method.or(preferred_otp_method);
        let now = Utc::now();
        let applied = self.update_current(reply.session(), |local| {
            local.advance(SessionState::OtpVerification);
            local.timestamps.mark(Milestone::ContactVerified, now);
            local.timestamps.touch(now);
            local.otp_method = method;
            local.customer_name = reply.data.customer_name.clone();
            if reply.data.masked_contact.is_some() {
                local.masked_contact = reply.data.masked_contact.clone();
            }
        });
        if applied.is_none() {
            return Ok(reply);
        }

        info!(otp_method = ?method, "contact verified");
        self.inner.events.emit(SessionEvent::ContactVerified {
            customer_name: reply.data.customer_name.clone(),
            otp_method: method,
        });
        Ok(reply)
    }

    /// Asks the server to send the first OTP.
    pub async fn initiate_otp(&self) -> Result<Reply<OtpDispatched>, Failure> {
        let session_id = self.require_session()?;
        let body = SessionRequest {
            session_id: session_id.clone(),
        };
        let request = self.post(INITIATE_OTP_PATH, &body)?;
        let scope = Scope::Session(&session_id);
        let reply = self
            .retrying("initiate_otp", |this| this.exchange::<OtpDispatched>(request.clone(), scope))
            .await?;

        let Some((method, masked_contact)) = self.record_dispatch(&reply, Milestone::OtpInitiated)
        else {
            return Ok(reply);
        };
        info!(otp_method = ?method, "OTP initiated");
        self.inner.events.emit(SessionEvent::OtpInitiated {
            method,
            masked_contact,
        });
        Ok(reply)
    }

    /// Submits the code the customer received.
    ///
    /// The code must be exactly six digits; anything else is rejected
    /// without a request.
    pub async fn verify_otp(&self, code: &str) -> Result<Reply<Authenticated>, Failure> {
        let session_id = self.require_session()?;
        let otp = validate_otp(code)?;
        let body = VerifyOtpRequest {
            session_id: session_id.clone(),
            otp,
        };
        let request = self.post(VERIFY_OTP_PATH, &body)?;
        let scope = Scope::Session(&session_id);
        let reply = self
            .retrying("verify_otp", |this| this.exchange::<Authenticated>(request.clone(), scope))
            .await?;

        let now = Utc::now();
        let applied = self.update_current(reply.session(), |local| {
            local.advance(SessionState::Authenticated);
            local.timestamps.mark(Milestone::Authenticated, now);
            local.timestamps.touch(now);
            local.customer_data = reply.data.customer_data.clone();
        });
        if applied.is_none() {
            return Ok(reply);
        }

        info!("customer authenticated");
        self.inner.events.emit(SessionEvent::OtpVerified);
        self.inner.events.emit(SessionEvent::AuthenticationSuccess {
            customer_data: reply.data.customer_data.clone(),
        });
        Ok(reply)
    }

    /// Asks the server to send a fresh OTP.
    pub async fn resend_otp(&self) -> Result<Reply<OtpDispatched>, Failure> {
        let session_id = self.require_session()?;
        let body = SessionRequest {
            session_id: session_id.clone(),
        };
        let request = self.post(RESEND_OTP_PATH, &body)?;
        let scope = Scope::Session(&session_id);
        let reply = self
            .retrying("resend_otp", |this| this.exchange::<OtpDispatched>(request.clone(), scope))
            .await?;

        let Some((method, masked_contact)) = self.record_dispatch(&reply, Milestone::OtpResent)
        else {
            return Ok(reply);
        };
        info!(otp_method = ?method, "OTP resent");
        self.inner.events.emit(SessionEvent::OtpResent {
            method,
            masked_contact,
        });
        Ok(reply)
    }

    /// Fetches the server's view of the session and merges it locally.
    ///
    /// Not retried. On `SESSION_EXPIRED` the caller decides whether to
    /// clear; [`validate_session`](Self::validate_session) does.
    pub async fn get_session_status(&self) -> Result<Reply<Session>, Failure> {
        let session_id = self.require_session()?;
        self.session_status(&session_id).await
    }

    async fn session_status(&self, session_id: &SessionId) -> Result<Reply<Session>, Failure> {
        let request = Request::get(session_status_path(session_id));
        let reply = self.exchange::<Session>(request, Scope::Session(session_id)).await?;

        let applied = self.update_current(reply.session(), |local| local.absorb(&reply.data));
        if applied.is_none() {
            debug!(%session_id, "status for a session that is no longer current");
            return Ok(reply);
        }
        debug!(state = %reply.data.state, "session status refreshed");
        self.inner.events.emit(SessionEvent::SessionUpdated {
            session: Box::new(reply.data.clone()),
        });
        Ok(reply)
    }

    /// OTP status of the current session. `None` until an OTP is initiated.
    pub async fn get_otp_status(&self) -> Result<Reply<Option<OtpStatus>>, Failure> {
        let session_id = self.require_session()?;
        self.fetch_otp_status(&session_id).await
    }

    /// OTP status of an explicit session. Not retried.
    pub async fn fetch_otp_status(
        &self,
        session_id: &SessionId,
    ) -> Result<Reply<Option<OtpStatus>>, Failure> {
        let reply = self
            .exchange::<OtpStatusPayload>(
                Request::get(otp_status_path(session_id)),
                Scope::Session(session_id),
            )
            .await?;
        Ok(reply.map(|payload| payload.otp_status))
    }

    /// Forgets the current session locally (logout).
    pub fn clear_session(&self) {
        info!("clearing session");
        self.reset_local(SessionEvent::AuthCleared);
    }

    /// Throws the current session away and creates a new one.
    pub async fn restart_session(&self) -> Result<Reply<SessionCreated>, Failure> {
        self.clear_session();
        let reply = self.create_session().await?;
        if self.session_id().as_ref() == Some(&reply.data.session_id) {
            self.inner.events.emit(SessionEvent::SessionRestarted {
                session_id: reply.data.session_id.clone(),
            });
        }
        Ok(reply)
    }

    /// Checks the session with the server and clears it if the server no
    /// longer knows it. Technical failures keep the session.
    ///
    /// Returns whether a session is still on record afterwards.
    pub async fn validate_session(&self) -> bool {
        let Some(session_id) = self.session_id() else {
            return false;
        };
        match self.session_status(&session_id).await {
            Ok(_) => {}
            Err(failure) if failure.code().invalidates_session() => {
                if self.reset_if_current(Some(&session_id), SessionEvent::AuthCleared) {
                    info!(code = %failure.code(), "session no longer valid");
                }
            }
            Err(failure) => {
                debug!(code = %failure.code(), "session validation inconclusive");
            }
        }
        self.session_id().is_some()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Runs `f` against the local mirror under its lock, but only while the
    /// current session id is `expected`. Returns `None` if it isn't.
    pub(crate) fn update_current<R>(
        &self,
        expected: Option<&SessionId>,
        f: impl FnOnce(&mut SessionSnapshot) -> R,
    ) -> Option<R> {
        let mut local = lock(&self.inner.local);
        if local.session_id.as_ref() != expected {
            return None;
        }
        Some(f(&mut local))
    }

    pub(crate) fn persist_session_id(&self, id: &SessionId) {
        self.inner
            .store
            .set(SESSION_ID_KEY, id, Some(self.inner.config.session_ttl));
    }

    /// Drops the local mirror and the persisted id, then emits `event`.
    pub(crate) fn reset_local(&self, event: SessionEvent) {
        {
            let mut local = lock(&self.inner.local);
            *local = SessionSnapshot::default();
            self.inner.store.remove(SESSION_ID_KEY);
        }
        self.inner.events.emit(event);
    }

    /// [`reset_local`](Self::reset_local), if `expected` is still the
    /// current session. Returns whether it was.
    pub(crate) fn reset_if_current(
        &self,
        expected: Option<&SessionId>,
        event: SessionEvent,
    ) -> bool {
        let reset = self.update_current(expected, |local| {
            *local = SessionSnapshot::default();
            self.inner.store.remove(SESSION_ID_KEY);
        });
        if reset.is_some() {
            self.inner.events.emit(event);
        }
        reset.is_some()
    }

    fn require_session(&self) -> Result<SessionId, Failure> {
        self.session_id().ok_or_else(Failure::no_session)
    }

    fn record_dispatch(
        &self,
        reply: &Reply<OtpDispatched>,
        milestone: Milestone,
    ) -> Option<(Option<OtpMethod>, Option<String>)> {
        let data = &reply.data;
        let now = Utc::now();
        self.update_current(reply.session(), |local| {
            if data.otp_method.is_some() {
                local.otp_method = data.otp_method;
            }
            if data.masked_contact.is_some() {
                local.masked_contact = data.masked_contact.clone();
            }
            local.timestamps.mark(milestone, now);
            local.timestamps.touch(now);
            (local.otp_method, local.masked_contact.clone())
        })
    }

    fn count_contact_failure(&self, session_id: &SessionId, failure: &Failure) {
        self.update_current(Some(session_id), |local| {
            let counter = local.contact_attempts;
            local.contact_attempts = match failure {
                Failure::Business {
                    remaining_attempts: Some(remaining),
                    ..
                } => AttemptCounter::from_remaining(*remaining, counter.max()),
                Failure::Technical { .. } => counter,
                _ if matches!(
                    failure.code(),
                    ErrorCode::NoSession | ErrorCode::AuthenticationRequired
                ) =>
                {
                    counter
                }
                _ => AttemptCounter::new(counter.used() + 1, counter.max()),
            };
        });
    }

    /// Runs `operation` under the configured retry policy, reporting each
    /// retry as a `RetryAttempt` event.
    async fn retrying<'a, R, F, Fut>(
        &'a self,
        name: &'static str,
        mut operation: F,
    ) -> Result<R, Failure>
    where
        F: FnMut(&'a Self) -> Fut,
        Fut: Future<Output = Result<R, Failure>>,
    {
        let events = &self.inner.events;
        with_retry(
            &self.inner.config.retry,
            || operation(self),
            |attempt, failure: &Failure| {
                warn!(
                    operation = name,
                    attempt,
                    code = %failure.code(),
                    "retrying after technical failure"
                );
                events.emit(SessionEvent::RetryAttempt {
                    operation: name,
                    attempt,
                    code: failure.code(),
                });
            },
        )
        .await
    }
}

impl<T: Transport> std::fmt::Debug for SessionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}
