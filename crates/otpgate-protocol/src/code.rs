//! The enumerated `error_code` values the auth API can return, plus the
//! few codes the client raises on its own.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An `error_code` from a failed response.
///
/// Codes the client doesn't recognise decode to [`ErrorCode::Unknown`]
/// instead of failing the whole response. `#[serde(other)]` is what makes
/// that work: it must sit on a unit variant and catches any unmatched tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- session --------------------------------------------------------
    /// Client-only: an operation needed a session and none was on record.
    NoSession,
    InvalidSession,
    SessionNotFound,
    SessionExpired,
    SessionLocked,
    SessionCreationFailed,
    MaxAttemptsExceeded,

    // -- contact validation ----------------------------------------------
    InvalidInput,
    InvalidEmail,
    InvalidEmailFormat,
    InvalidPhone,
    InvalidPhoneFormat,
    InvalidOtpMethod,
    EmailRequired,
    PhoneRequired,
    CustomerNotFound,
    CustomerNotFoundEmail,
    CustomerNotFoundPhone,
    ContactNotVerified,

    // -- OTP ------------------------------------------------------------
    InvalidOtp,
    /// Client-only: the code was not exactly six digits.
    InvalidOtpFormat,
    OtpExpired,
    OtpNotInitiated,
    OtpInitiationFailed,
    VerificationFailed,
    SendFailed,
    ResendFailed,

    // -- technical ------------------------------------------------------
    ServiceError,
    ServiceUnavailable,
    DatabaseError,
    NetworkError,
    TimeoutError,

    // -- state ------------------------------------------------------------
    InvalidState,
    RateLimited,
    AuthenticationRequired,

    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// Codes that blame infrastructure rather than the user. Failures
    /// carrying one of these are retried with backoff.
    pub fn is_technical(self) -> bool {
        matches!(
            self,
            Self::ServiceError
                | Self::ServiceUnavailable
                | Self::DatabaseError
                | Self::NetworkError
                | Self::TimeoutError
                | Self::SendFailed
                | Self::ResendFailed
        )
    }

    /// Codes that mean "the input was malformed".
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            Self::InvalidInput
                | Self::InvalidEmail
                | Self::InvalidEmailFormat
                | Self::InvalidPhone
                | Self::InvalidPhoneFormat
                | Self::InvalidOtpMethod
                | Self::InvalidOtpFormat
                | Self::EmailRequired
                | Self::PhoneRequired
        )
    }

    /// Codes after which the current session id is useless.
    pub fn invalidates_session(self) -> bool {
        matches!(
            self,
            Self::InvalidSession | Self::SessionNotFound | Self::SessionExpired
        )
    }

    /// The wire spelling, e.g. `"INVALID_OTP"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoSession => "NO_SESSION",
            Self::InvalidSession => "INVALID_SESSION",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionLocked => "SESSION_LOCKED",
            Self::SessionCreationFailed => "SESSION_CREATION_FAILED",
            Self::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidEmailFormat => "INVALID_EMAIL_FORMAT",
            Self::InvalidPhone => "INVALID_PHONE",
            Self::InvalidPhoneFormat => "INVALID_PHONE_FORMAT",
            Self::InvalidOtpMethod => "INVALID_OTP_METHOD",
            Self::EmailRequired => "EMAIL_REQUIRED",
            Self::PhoneRequired => "PHONE_REQUIRED",
            Self::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            Self::CustomerNotFoundEmail => "CUSTOMER_NOT_FOUND_EMAIL",
            Self::CustomerNotFoundPhone => "CUSTOMER_NOT_FOUND_PHONE",
            Self::ContactNotVerified => "CONTACT_NOT_VERIFIED",
            Self::InvalidOtp => "INVALID_OTP",
            Self::InvalidOtpFormat => "INVALID_OTP_FORMAT",
            Self::OtpExpired => "OTP_EXPIRED",
            Self::OtpNotInitiated => "OTP_NOT_INITIATED",
            Self::OtpInitiationFailed => "OTP_INITIATION_FAILED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::SendFailed => "SEND_FAILED",
            Self::ResendFailed => "RESEND_FAILED",
            Self::ServiceError => "SERVICE_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::RateLimited => "RATE_LIMITED",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Fixed, human-readable text for showing this code to a customer.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NoSession | Self::InvalidSession | Self::SessionNotFound => {
                "Your session could not be found. Please start again."
            }
            Self::SessionExpired => {
                "Your session has expired. Please start again."
            }
            Self::SessionLocked | Self::MaxAttemptsExceeded => {
                "Too many failed attempts. Your session is temporarily locked."
            }
            Self::SessionCreationFailed => {
                "We couldn't start a verification session. Please contact support@swissbank.com."
            }
            Self::InvalidInput => {
                "Please provide either an email address or a phone number, not both."
            }
            Self::InvalidEmail | Self::InvalidEmailFormat => {
                "Please enter a valid email address."
            }
            Self::InvalidPhone | Self::InvalidPhoneFormat => {
                "Please enter a valid phone number (10 to 15 digits)."
            }
            Self::InvalidOtpMethod => "Please choose email or SMS for your code.",
            Self::EmailRequired => "An email address is required for email codes.",
            Self::PhoneRequired => "A phone number is required for SMS codes.",
            Self::CustomerNotFound
            | Self::CustomerNotFoundEmail
            | Self::CustomerNotFoundPhone => {
                "We couldn't find an account with those details."
            }
            Self::ContactNotVerified => {
                "Please verify your contact details before requesting a code."
            }
            Self::InvalidOtp | Self::VerificationFailed => {
                "That code is incorrect. Please try again."
            }
            Self::InvalidOtpFormat => "Please enter the 6-digit code.",
            Self::OtpExpired => "Your code has expired. Please request a new one.",
            Self::OtpNotInitiated => "Please request a verification code first.",
            Self::OtpInitiationFailed | Self::SendFailed => {
                "We couldn't send your code. Please try again."
            }
            Self::ResendFailed => "We couldn't resend your code. Please try again.",
            Self::ServiceError
            | Self::ServiceUnavailable
            | Self::DatabaseError => {
                "Our verification service is temporarily unavailable. Please try again."
            }
            Self::NetworkError => {
                "We couldn't reach the server. Please check your connection."
            }
            Self::TimeoutError => "The server took too long to respond. Please try again.",
            Self::InvalidState => {
                "This step isn't available right now. Please restart verification."
            }
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::AuthenticationRequired => "Please verify your identity to continue.",
            Self::Unknown => "Sorry, something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
