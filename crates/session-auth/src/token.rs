//! Backend response envelope and credential-producing payloads
//!
//! Every board endpoint answers with `{ success, message, data }`. Login and
//! renewal put the new access credential in `data.accessToken`. Field names
//! are camelCase on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::credentials::AccessCredential;
use crate::error::{Error, Result};

/// Standard `{ success, message, data }` response wrapper.
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap `data`, treating `success: false` or a missing payload as errors.
    pub fn into_data(self) -> Result<T> {
        if !self.success {
            return Err(Error::Rejected(
                self.message
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| Error::Envelope("response carried no data".into()))
    }
}

/// Parse a full envelope from raw response bytes and return its payload.
pub fn parse_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: ApiEnvelope<T> =
        serde_json::from_slice(body).map_err(|e| Error::Envelope(e.to_string()))?;
    envelope.into_data()
}

/// Extract the `message` field from an envelope-shaped body, if any.
///
/// Works on error bodies whose `data` does not match any known payload.
pub fn envelope_message(body: &[u8]) -> Option<String> {
    let envelope: ApiEnvelope<serde_json::Value> = serde_json::from_slice(body).ok()?;
    envelope.message.filter(|m| !m.is_empty())
}

/// `data` payload of login and renewal responses.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenPayload {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// Parse a login or renewal response body into a fresh access credential.
pub fn parse_token_envelope(body: &[u8]) -> Result<AccessCredential> {
    let payload: TokenPayload = parse_envelope(body)?;
    if payload.access_token.is_empty() {
        return Err(Error::Envelope("accessToken is empty".into()));
    }
    Ok(AccessCredential::new(payload.access_token))
}

/// Username/password login body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Local account registration body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub email: String,
    pub nickname: String,
    pub gender: String,
    pub provider: String,
}

impl SignupRequest {
    /// Registration for a local (non-social) account with no gender given.
    pub fn local(username: String, password: String, email: String, nickname: String) -> Self {
        Self {
            username,
            confirm_password: password.clone(),
            password,
            email,
            nickname,
            gender: "N".into(),
            provider: "LOCAL".into(),
        }
    }
}
