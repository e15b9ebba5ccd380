//! Request/response plumbing.
//!
//! Every call to the backend goes through [`SessionManager::exchange`],
//! the one place where a transport outcome turns into either a
//! [`Reply`] or a classified [`Failure`]. Side effects that apply to any
//! response live here too: 401 handling, session-id rotation and
//! lock/expiry tracking.
//!
//! Those side effects only land while the session a request was sent for
//! is still the current one. A reply that arrives after a logout or a
//! restart is handed back to its caller and otherwise ignored.

use otpgate_protocol::{Codec, ErrorCode, Failure, ResponseHeader, SessionId, SessionState};
use otpgate_transport::{Request, Response, Transport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::snapshot::Milestone;
use crate::{SessionEvent, SessionManager};

/// A successful operation: the server's message plus the decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub message: String,
    pub data: T,
    /// The local session this reply speaks for: the one it was sent for,
    /// or the id the server rotated that session to.
    session: Option<SessionId>,
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            message: self.message,
            data: f(self.data),
            session: self.session,
        }
    }

    pub(crate) fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }
}

/// The local session a request speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope<'a> {
    /// Creating a session to replace `current` (`None` if there is none).
    Create(Option<&'a SessionId>),
    /// An existing session.
    Session(&'a SessionId),
}

impl<'a> Scope<'a> {
    /// The local session id this request's outcome may touch.
    pub(crate) fn expected(self) -> Option<&'a SessionId> {
        match self {
            Self::Create(current) => current,
            Self::Session(id) => Some(id),
        }
    }
}

pub(crate) fn technical(code: ErrorCode, status: Option<u16>) -> Failure {
    Failure::Technical {
        code,
        message: code.user_message().to_owned(),
        status,
    }
}

impl<T: Transport> SessionManager<T> {
    /// Encodes `body` into a POST to `path`.
    pub(crate) fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Request, Failure> {
        let bytes = self
            .inner
            .codec
            .encode(body)
            .map_err(|e| Failure::validation_with(ErrorCode::InvalidInput, e.to_string()))?;
        Ok(Request::post(path, bytes))
    }

    /// Sends `request` once on behalf of `scope` and normalizes the outcome.
    pub(crate) async fn exchange<P: DeserializeOwned>(
        &self,
        request: Request,
        scope: Scope<'_>,
    ) -> Result<Reply<P>, Failure> {
        debug!(method = %request.method, path = %request.path, "auth request");
        let response = self.send(request).await?;
        let result = self.normalize(response, scope);
        if let Err(failure) = &result {
            self.observe_failure(failure, scope);
        }
        result
    }

    async fn send(&self, request: Request) -> Result<Response, Failure> {
        let timeout = self.inner.config.request_timeout;
        match tokio::time::timeout(timeout, self.inner.transport.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => {
                debug!(error = %e, "transport timed out");
                Err(technical(ErrorCode::TimeoutError, None))
            }
            Ok(Err(e)) => {
                debug!(error = %e, "transport failed");
                Err(technical(ErrorCode::NetworkError, None))
            }
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "request deadline elapsed");
                Err(technical(ErrorCode::TimeoutError, None))
            }
        }
    }

    fn normalize<P: DeserializeOwned>(
        &self,
        response: Response,
        scope: Scope<'_>,
    ) -> Result<Reply<P>, Failure> {
        let status = response.status;
        let codec = &self.inner.codec;

        if status == 401 {
            let header: ResponseHeader = codec.decode(&response.body).unwrap_or_default();
            if self.reset_if_current(scope.expected(), SessionEvent::AuthenticationRequired) {
                warn!("server requires re-authentication, dropping session");
            } else {
                debug!("401 for a session that is no longer current");
            }
            return Err(Failure::from_response(status, &header));
        }

        let header: ResponseHeader = match codec.decode(&response.body) {
            Ok(header) => header,
            Err(e) => {
                debug!(status, error = %e, "unreadable response body");
                let code = if status >= 500 {
                    ErrorCode::ServiceError
                } else {
                    ErrorCode::NetworkError
                };
                return Err(technical(code, Some(status)));
            }
        };

        let mut session = scope.expected().cloned();
        if let (Some(id), Scope::Session(sent_for)) = (&header.session_id, scope) {
            if self.adopt_session_id(sent_for, id) {
                session = Some(id.clone());
            }
        }

        if header.success && response.is_success() {
            let data = codec.decode::<P>(&response.body).map_err(|e| {
                debug!(status, error = %e, "payload does not match the expected shape");
                technical(ErrorCode::NetworkError, Some(status))
            })?;
            return Ok(Reply {
                message: header.message,
                data,
                session,
            });
        }

        Err(Failure::from_response(status, &header))
    }

    /// Adopts `id` when the server answers a request for `sent_for` with a
    /// different id, as long as `sent_for` is still the current session.
    /// Returns whether it did.
    fn adopt_session_id(&self, sent_for: &SessionId, id: &SessionId) -> bool {
        if sent_for == id {
            return false;
        }
        let rotated = self.update_current(Some(sent_for), |local| {
            local.session_id = Some(id.clone());
            self.persist_session_id(id);
        });
        if rotated.is_some() {
            info!(from = %sent_for, to = %id, "server rotated session id");
        }
        rotated.is_some()
    }

    /// Mirrors lock and expiry codes into the local state.
    fn observe_failure(&self, failure: &Failure, scope: Scope<'_>) {
        let target = match failure.code() {
            ErrorCode::SessionLocked | ErrorCode::MaxAttemptsExceeded => SessionState::Locked,
            ErrorCode::SessionExpired => SessionState::Expired,
            _ => return,
        };
        let Scope::Session(expected) = scope else {
            return;
        };
        let now = chrono::Utc::now();
        self.update_current(Some(expected), |local| {
            if local.advance(target) && target == SessionState::Locked {
                local.timestamps.mark(Milestone::Locked, now);
            }
        });
    }
}
