//! Single request/response exchange with the board backend
//!
//! `Transport` is the seam under the dispatcher: one descriptor in, one
//! response or typed failure out. It knows nothing about credentials or
//! renewal. `ReqwestTransport` is the production implementation; its
//! `SessionCookies` jar carries the out-of-band refresh cookie set by login,
//! and is re-saved whenever a response sets cookies.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, debug_span, warn};

use crate::cookies::SessionCookies;
use crate::descriptor::RequestDescriptor;
use crate::error::{Error, Result};

/// Successful (2xx) response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the raw body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    /// Unwrap the `{ success, message, data }` envelope and return `data`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(session_auth::parse_envelope(&self.body)?)
    }
}

/// One outbound exchange. Non-2xx statuses are errors, not responses.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;
}

/// HTTP transport over a shared reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    cookies: SessionCookies,
}

impl ReqwestTransport {
    /// Build a transport whose cookies live only as long as the process.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        let cookies = SessionCookies::in_memory(&base_url)?;
        Self::with_cookies(base_url, timeout, cookies)
    }

    /// Build a transport around an existing jar, e.g. one restored from disk.
    pub fn with_cookies(
        base_url: impl Into<String>,
        timeout: Duration,
        cookies: SessionCookies,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_provider(cookies.provider())
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
            cookies,
        })
    }

    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a descriptor path against the base URL. Absolute URLs pass through.
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl Transport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
        let span = debug_span!(
            "transport",
            request_id = %request.request_id(),
            method = %request.method(),
            path = %request.path()
        );
        Box::pin(self.exchange(request).instrument(span))
    }
}

impl ReqwestTransport {
    async fn exchange(&self, request: &RequestDescriptor) -> Result<Response> {
        let url = self.url_for(request.path());
        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone())
            .timeout(self.timeout);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;

        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if headers.contains_key(SET_COOKIE) {
            if let Err(e) = self.cookies.save().await {
                warn!(error = %e, "failed to persist session cookies");
            }
        }

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                message: session_auth::envelope_message(&body),
            });
        }

        Ok(Response::new(status, headers, body))
    }
}
