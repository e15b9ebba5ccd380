//! The tagged failure every auth operation resolves to.
//!
//! A failure is classified exactly once, where the response is normalized,
//! into one of three kinds. Everything downstream (the retry engine, the
//! UI, logging) dispatches on the tag and never re-inspects the payload.

use otpgate_retry::Retryable;

use crate::{ErrorCode, ResponseHeader};

/// Coarse category of a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Business,
    Technical,
}

/// Why an auth operation did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    /// Malformed input. Caught locally before any request, or reported by
    /// the server's own validation. Never retried.
    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    /// A rule said no: wrong state, attempts exhausted, expired OTP,
    /// locked session, unknown customer. Shown to the user as-is.
    #[error("{message}")]
    Business {
        code: ErrorCode,
        message: String,
        /// The user may try the same action again (e.g. after a 429).
        retry_allowed: bool,
        retry_after_minutes: Option<u64>,
        remaining_attempts: Option<u32>,
    },

    /// Infrastructure failed: network, timeout, 5xx, service errors.
    /// Retried with backoff; once retries run out the user can retry
    /// manually.
    #[error("{message}")]
    Technical {
        code: ErrorCode,
        message: String,
        status: Option<u16>,
    },
}

impl Failure {
    /// A validation failure with the code's standard message.
    pub fn validation(code: ErrorCode) -> Self {
        Self::validation_with(code, code.user_message())
    }

    pub fn validation_with(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// A business failure with the code's standard message.
    pub fn business(code: ErrorCode) -> Self {
        Self::Business {
            code,
            message: code.user_message().to_owned(),
            retry_allowed: false,
            retry_after_minutes: None,
            remaining_attempts: None,
        }
    }

    pub fn technical(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Technical {
            code,
            message: message.into(),
            status: None,
        }
    }

    /// The client-side "no session on record" failure.
    pub fn no_session() -> Self {
        Self::business(ErrorCode::NoSession)
    }

    /// Classifies a failed response.
    ///
    /// Rules, first match wins:
    /// 1. 5xx, an explicit `technical_error`, or a technical code → `Technical`.
    /// 2. A validation code → `Validation`.
    /// 3. Anything else → `Business`; 429 or `retry_allowed` marks it retryable
    ///    by the user.
    ///
    /// A missing `error_code` is inferred from the status where possible.
    pub fn from_response(status: u16, header: &ResponseHeader) -> Self {
        let code = header.error_code.unwrap_or(match status {
            401 => ErrorCode::AuthenticationRequired,
            429 => ErrorCode::RateLimited,
            s if s >= 500 => ErrorCode::ServiceError,
            _ => ErrorCode::Unknown,
        });
        let message = if header.message.trim().is_empty() {
            code.user_message().to_owned()
        } else {
            header.message.clone()
        };

        if status >= 500 || header.technical_error == Some(true) || code.is_technical() {
            return Self::Technical {
                code,
                message,
                status: Some(status),
            };
        }
        if code.is_validation() {
            return Self::Validation { code, message };
        }
        Self::Business {
            code,
            message,
            retry_allowed: status == 429 || header.retry_allowed.unwrap_or(false),
            retry_after_minutes: header.retry_after_minutes,
            remaining_attempts: header.remaining_attempts,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation { .. } => FailureKind::Validation,
            Self::Business { .. } => FailureKind::Business,
            Self::Technical { .. } => FailureKind::Technical,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. }
            | Self::Business { code, .. }
            | Self::Technical { code, .. } => *code,
        }
    }

    /// The message to show: the server's wording when it sent one, the
    /// standard text otherwise.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Business { message, .. }
            | Self::Technical { message, .. } => message,
        }
    }

    /// Whether the UI should offer the user a manual retry.
    pub fn retry_allowed(&self) -> bool {
        match self {
            Self::Validation { .. } => false,
            Self::Business { retry_allowed, .. } => *retry_allowed,
            Self::Technical { .. } => true,
        }
    }

    pub fn is_technical(&self) -> bool {
        matches!(self, Self::Technical { .. })
    }

    pub fn retry_after_minutes(&self) -> Option<u64> {
        match self {
            Self::Business {
                retry_after_minutes,
                ..
            } => *retry_after_minutes,
            _ => None,
        }
    }
}

impl Retryable for Failure {
    fn is_retryable(&self) -> bool {
        self.is_technical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(code: Option<ErrorCode>) -> ResponseHeader {
        ResponseHeader {
            success: false,
            message: "server says no".into(),
            error_code: code,
            ..ResponseHeader::default()
        }
    }

    #[test]
    fn test_technical_code_is_technical() {
        let f = Failure::from_response(200, &header(Some(ErrorCode::DatabaseError)));
        assert_eq!(f.kind(), FailureKind::Technical);
        assert!(f.is_retryable());
        assert!(f.retry_allowed());
    }

    #[test]
    fn test_explicit_technical_marker_wins() {
        let mut h = header(Some(ErrorCode::CustomerNotFound));
        h.technical_error = Some(true);
        assert!(Failure::from_response(200, &h).is_technical());
    }

    #[test]
    fn test_5xx_is_technical_even_with_business_code() {
        let f = Failure::from_response(503, &header(Some(ErrorCode::InvalidState)));
        assert!(matches!(f, Failure::Technical { status: Some(503), .. }));
    }

    #[test]
    fn test_validation_code_is_validation() {
        let f = Failure::from_response(400, &header(Some(ErrorCode::InvalidEmailFormat)));
        assert_eq!(f.kind(), FailureKind::Validation);
        assert!(!f.is_retryable());
    }

    #[test]
    fn test_business_code_keeps_server_message() {
        let mut h = header(Some(ErrorCode::SessionLocked));
        h.retry_after_minutes = Some(300);
        let f = Failure::from_response(200, &h);
        assert_eq!(f.kind(), FailureKind::Business);
        assert_eq!(f.message(), "server says no");
        assert_eq!(f.retry_after_minutes(), Some(300));
        assert!(!f.is_retryable());
    }

    #[test]
    fn test_429_marks_retry_allowed_but_not_retryable() {
        let f = Failure::from_response(429, &header(None));
        assert_eq!(f.code(), ErrorCode::RateLimited);
        assert!(f.retry_allowed());
        assert!(!f.is_retryable());
    }

    #[test]
    fn test_missing_message_uses_lookup() {
        let h = ResponseHeader {
            error_code: Some(ErrorCode::OtpExpired),
            ..ResponseHeader::default()
        };
        let f = Failure::from_response(200, &h);
        assert_eq!(f.message(), ErrorCode::OtpExpired.user_message());
    }

    #[test]
    fn test_401_without_code_is_authentication_required() {
        let f = Failure::from_response(401, &ResponseHeader::default());
        assert_eq!(f.code(), ErrorCode::AuthenticationRequired);
        assert_eq!(f.kind(), FailureKind::Business);
    }

    #[test]
    fn test_no_session_is_not_retryable() {
        let f = Failure::no_session();
        assert_eq!(f.code(), ErrorCode::NoSession);
        assert!(!f.is_retryable());
    }
}
