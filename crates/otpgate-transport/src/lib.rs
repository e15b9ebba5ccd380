//! Transport abstraction layer for otpgate.
//!
//! Provides the [`Transport`] trait: send one request to the auth backend
//! and return its status code and raw body. The session layer neither
//! knows nor cares whether that goes over `reqwest`, a browser `fetch`, or
//! an in-memory test double.
//!
//! # Feature Flags
//!
//! - `http` (default): HTTP transport via `reqwest`

mod error;
#[cfg(feature = "http")]
mod http;

pub use error::TransportError;
#[cfg(feature = "http")]
pub use http::HttpTransport;

use std::fmt;
use std::future::Future;

/// HTTP method of a [`Request`]. The auth API only uses these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// One request to the auth backend. `path` is relative to the transport's
/// base URL; `body` is already-encoded JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// The status code and raw body of a response.
///
/// Non-2xx statuses are *not* transport errors: the auth API puts its
/// error payload in the body, and the session layer needs to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the auth backend.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → the session manager shares one transport
///   across its own tasks (the maintenance loop, the poller).
/// - The returned future is `Send` so operations can run on any runtime
///   worker thread.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and waits for the full response.
    ///
    /// Returns `Err` only when no HTTP response was obtained (network
    /// failure, timeout). Any status code, including 4xx/5xx, is `Ok`.
    fn send(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}
