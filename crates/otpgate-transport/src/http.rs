//! HTTP transport implementation using `reqwest`.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use crate::{Method, Request, Response, Transport, TransportError};

/// A [`Transport`] that talks to the auth backend over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Per-request deadline used by [`HttpTransport::new`].
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a transport rooted at `base_url` (scheme + host, e.g.
    /// `https://bank.example`).
    pub fn new(base_url: Url) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: Url,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        tracing::debug!(%base_url, ?timeout, "HTTP transport ready");
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = self.base_url.join(&request.path)?;
        tracing::debug!(method = %request.method, %url, "sending request");

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(request.body.unwrap_or_default()),
        };

        let resp = builder
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| self.map_error(e))?;

        tracing::debug!(status, bytes = body.len(), "response received");
        Ok(Response {
            status,
            body: body.to_vec(),
        })
    }
}
