//! Session manager configuration.

use std::time::Duration;

use otpgate_retry::RetryPolicy;
use tracing::warn;

/// Store key holding the current session id (namespaced by the store).
pub const SESSION_ID_KEY: &str = "session_id";

/// Tunables for a [`SessionManager`](crate::SessionManager).
///
/// Everything has a sensible default; override only what you need:
///
/// ```
/// use std::time::Duration;
/// use otpgate_session::SessionConfig;
///
/// let config = SessionConfig {
///     request_timeout: Duration::from_secs(10),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.revalidate_interval, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sent as `user_agent` when creating a session.
    pub user_agent: String,
    /// Sent as `ip_address` when creating a session, if known.
    pub ip_address: Option<String>,
    /// Upper bound on a single request, transport included. Default: 30 s.
    pub request_timeout: Duration,
    /// How often the maintenance task re-validates the session. Default: 60 s.
    pub revalidate_interval: Duration,
    /// How long a persisted session id stays valid locally. Default: 24 h.
    pub session_ttl: Duration,
    /// Backoff for technical failures.
    pub retry: RetryPolicy,
    /// How far an event subscriber may lag before losing events.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("otpgate/", env!("CARGO_PKG_VERSION")).to_owned(),
            ip_address: None,
            request_timeout: Duration::from_secs(30),
            revalidate_interval: Duration::from_secs(60),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            retry: RetryPolicy::default(),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);
    pub const MIN_REVALIDATE_INTERVAL: Duration = Duration::from_secs(1);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`SessionManager::new`](crate::SessionManager::new).
    pub fn validated(mut self) -> Self {
        if self.request_timeout < Self::MIN_REQUEST_TIMEOUT {
            warn!(
                timeout_ms = self.request_timeout.as_millis() as u64,
                "request_timeout below minimum, clamping"
            );
            self.request_timeout = Self::MIN_REQUEST_TIMEOUT;
        }
        if self.revalidate_interval < Self::MIN_REVALIDATE_INTERVAL {
            warn!(
                interval_ms = self.revalidate_interval.as_millis() as u64,
                "revalidate_interval below minimum, clamping"
            );
            self.revalidate_interval = Self::MIN_REVALIDATE_INTERVAL;
        }
        if self.session_ttl.is_zero() {
            warn!("session_ttl is zero, falling back to 24h");
            self.session_ttl = Self::default().session_ttl;
        }
        self.event_capacity = self.event_capacity.max(1);
        self.retry = self.retry.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.request_timeout, Duration::from_secs(30));
        assert_eq!(c.session_ttl, Duration::from_secs(86_400));
        assert_eq!(c.retry.max_retries, 3);
        assert!(c.user_agent.starts_with("otpgate/"));
    }

    #[test]
    fn test_validated_clamps_tiny_values() {
        let c = SessionConfig {
            request_timeout: Duration::ZERO,
            revalidate_interval: Duration::from_millis(5),
            session_ttl: Duration::ZERO,
            event_capacity: 0,
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(c.request_timeout, SessionConfig::MIN_REQUEST_TIMEOUT);
        assert_eq!(c.revalidate_interval, SessionConfig::MIN_REVALIDATE_INTERVAL);
        assert_eq!(c.session_ttl, Duration::from_secs(86_400));
        assert_eq!(c.event_capacity, 1);
    }
}
