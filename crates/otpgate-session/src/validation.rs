//! Local input checks, run before any request leaves the client.

use std::sync::LazyLock;

use otpgate_protocol::{ErrorCode, Failure};
use regex::Regex;

/// Longest email address accepted (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;
/// Digit-count bounds for a phone number once formatting is stripped.
pub const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 10..=15;
/// Length of an OTP.
pub const OTP_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// The one contact channel a customer identified themselves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Email(String),
    Phone(String),
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_PATTERN.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    PHONE_DIGITS.contains(&digits)
}

/// Checks that exactly one of `email`/`phone` is given and well-formed.
///
/// Blank strings count as absent. Values are trimmed.
pub fn validate_contact(email: Option<&str>, phone: Option<&str>) -> Result<Contact, Failure> {
    let email = email.map(str::trim).filter(|s| !s.is_empty());
    let phone = phone.map(str::trim).filter(|s| !s.is_empty());

    match (email, phone) {
        (Some(_), Some(_)) => Err(Failure::validation_with(
            ErrorCode::InvalidInput,
            "Please provide either email or phone number, not both.",
        )),
        (None, None) => Err(Failure::validation_with(
            ErrorCode::InvalidInput,
            "Please provide email or phone number.",
        )),
        (Some(email), None) if !is_valid_email(email) => {
            Err(Failure::validation(ErrorCode::InvalidEmailFormat))
        }
        (Some(email), None) => Ok(Contact::Email(email.to_owned())),
        (None, Some(phone)) if !is_valid_phone(phone) => {
            Err(Failure::validation(ErrorCode::InvalidPhoneFormat))
        }
        (None, Some(phone)) => Ok(Contact::Phone(phone.to_owned())),
    }
}

/// Returns the trimmed code if it is exactly six ASCII digits.
pub fn validate_otp(code: &str) -> Result<String, Failure> {
    let code = code.trim();
    if code.len() == OTP_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(code.to_owned())
    } else {
        Err(Failure::validation(ErrorCode::InvalidOtpFormat))
    }
}
