//! Request bodies and response payloads for each auth API operation.
//!
//! Responses are decoded in two passes over the same bytes: first the
//! [`ResponseHeader`] every response shares, then (only on success) the
//! operation-specific payload. Payload structs ignore the header fields,
//! and the header ignores the payload's.

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, OtpMethod, OtpStatus, ProtocolError, SessionId, SessionState};

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

pub const CREATE_SESSION_PATH: &str = "/api/auth/session";
pub const VERIFY_CONTACT_PATH: &str = "/api/auth/verify-contact";
pub const INITIATE_OTP_PATH: &str = "/api/auth/initiate-otp";
pub const VERIFY_OTP_PATH: &str = "/api/auth/verify-otp";
pub const RESEND_OTP_PATH: &str = "/api/auth/resend-otp";

/// `GET` path for the session status projection.
pub fn session_status_path(id: &SessionId) -> String {
    format!("/api/auth/session/{id}")
}

/// `GET` path for the OTP status projection.
pub fn otp_status_path(id: &SessionId) -> String {
    format!("/api/auth/session/{id}/otp-status")
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyContactRequest {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_otp_method: Option<OtpMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub session_id: SessionId,
    pub otp: String,
}

/// Body for operations that only need the session id (initiate, resend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Fields shared by every response, success or failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseHeader {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
    #[serde(default)]
    pub retry_allowed: Option<bool>,
    #[serde(default)]
    pub technical_error: Option<bool>,
    #[serde(default)]
    pub retry_after_minutes: Option<u64>,
    /// Present when the server issues or rotates the session id.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub remaining_attempts: Option<u32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Payload of a successful "create session".
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    #[serde(default)]
    pub state: Option<SessionState>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub expires_in_minutes: Option<u64>,
}

impl SessionCreated {
    /// Rejects a created session the client could never use.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.session_id.as_str().trim().is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "create session returned a blank session id".into(),
            ));
        }
        Ok(())
    }
}

/// Payload of a successful "verify contact".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContactVerified {
    pub customer_name: Option<String>,
    pub customer_data: Option<serde_json::Value>,
    pub otp_method: Option<OtpMethod>,
    pub masked_contact: Option<String>,
}

/// Payload of a successful "initiate OTP" or "resend OTP".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OtpDispatched {
    pub otp_method: Option<OtpMethod>,
    pub masked_contact: Option<String>,
    pub expires_in_minutes: Option<u64>,
}

/// Payload of a successful "verify OTP".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Authenticated {
    pub customer_data: Option<serde_json::Value>,
}

/// Payload of the OTP status endpoint. `None` means not yet initiated.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OtpStatusPayload {
    pub otp_status: Option<OtpStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_created_with_blank_id_is_invalid() {
        let created: SessionCreated = serde_json::from_str(r#"{"session_id": "  "}"#).unwrap();
        assert!(matches!(created.validate(), Err(ProtocolError::InvalidMessage(_))));

        let created: SessionCreated = serde_json::from_str(r#"{"session_id": "s-1"}"#).unwrap();
        assert!(created.validate().is_ok());
    }

    #[test]
    fn test_verify_contact_omits_absent_fields() {
        let req = VerifyContactRequest {
            session_id: SessionId::new("s"),
            email: Some("a@b.com".into()),
            phone: None,
            preferred_otp_method: Some(OtpMethod::Sms),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "session_id": "s",
                "email": "a@b.com",
                "preferred_otp_method": "sms"
            })
        );
    }

    #[test]
    fn test_header_and_payload_decode_from_same_bytes() {
        let body = br#"{
            "success": true,
            "message": "Contact details verified successfully.",
            "session_id": "s-1",
            "customer_name": "Ada",
            "otp_method": "email"
        }"#;
        let header: ResponseHeader = serde_json::from_slice(body).unwrap();
        let payload: ContactVerified = serde_json::from_slice(body).unwrap();
        assert!(header.success);
        assert_eq!(header.session_id, Some(SessionId::new("s-1")));
        assert_eq!(payload.customer_name.as_deref(), Some("Ada"));
        assert_eq!(payload.otp_method, Some(OtpMethod::Email));
    }

    #[test]
    fn test_null_otp_status_is_none() {
        let p: OtpStatusPayload =
            serde_json::from_str(r#"{"success": true, "otp_status": null}"#).unwrap();
        assert!(p.otp_status.is_none());
    }

    #[test]
    fn test_paths() {
        let id = SessionId::new("xyz");
        assert_eq!(session_status_path(&id), "/api/auth/session/xyz");
        assert_eq!(otp_status_path(&id), "/api/auth/session/xyz/otp-status");
    }
}
