//! Outgoing request descriptors
//!
//! A descriptor is a value: method, path, headers, optional JSON body and a
//! `retry_count` of 0 or 1. Replaying after a renewal produces a new
//! descriptor via `replay()` instead of flagging the original, so a
//! descriptor that has been replayed once is recognizable by value alone.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};

/// Highest `retry_count` a descriptor can carry.
pub const MAX_RETRY_COUNT: u8 = 1;

#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    request_id: String,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    retry_count: u8,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            retry_count: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` and attach it.
    pub fn with_body<T: serde::Serialize>(self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::InvalidRequest(format!("unserializable body: {e}")))?;
        Ok(self.with_json(value))
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("invalid value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Copy of this descriptor marked as replayed once.
    ///
    /// Keeps the request id so the original attempt and its replay correlate
    /// in logs.
    pub fn replay(&self) -> Self {
        Self {
            retry_count: MAX_RETRY_COUNT,
            ..self.clone()
        }
    }

    /// Whether this descriptor has already been replayed after a renewal.
    pub fn is_replay(&self) -> bool {
        self.retry_count >= MAX_RETRY_COUNT
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }
}
