//! Error taxonomy for dispatched requests
//!
//! `HttpStatus` with status 401 on a first attempt never reaches a caller;
//! the dispatcher hands it to the refresh coordinator. Everything else here
//! is what `RequestDispatcher::send` can return.

/// Fallback text for `Error::user_message` when nothing better is available.
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred.";

/// Errors surfaced by the request pipeline.
///
/// `Clone` so a single renewal failure can be delivered to every caller that
/// was blocked on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Network-level failure: DNS, connect, reset, transport timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx application response. `message` is the backend envelope's
    /// `message` when the body carried one.
    #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    HttpStatus {
        status: u16,
        message: Option<String>,
    },

    /// The renewal call failed. Every caller blocked on that renewal gets
    /// this same value, and the session has been cleared.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// 2xx response whose body is not the expected envelope.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Descriptor could not be turned into an HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The credential store could not persist a change.
    #[error("session storage error: {0}")]
    Session(String),
}

impl Error {
    /// Status code for `HttpStatus` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a 401 from a protected endpoint.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Text suitable for showing to a user.
    ///
    /// Prefers the backend's own `message`, then this error's display text,
    /// then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        let backend = match self {
            Error::HttpStatus { message, .. } => message.clone(),
            Error::Refresh(message) if !message.is_empty() => Some(message.clone()),
            _ => None,
        };
        if let Some(message) = backend {
            return message;
        }
        let display = self.to_string();
        if display.is_empty() {
            fallback.to_string()
        } else {
            display
        }
    }
}

impl From<session_auth::Error> for Error {
    fn from(e: session_auth::Error) -> Self {
        match e {
            session_auth::Error::Rejected(msg) => Error::InvalidResponse(msg),
            session_auth::Error::Envelope(_) => Error::InvalidResponse(e.to_string()),
            session_auth::Error::Io(_) | session_auth::Error::CredentialParse(_) => {
                Error::Session(e.to_string())
            }
        }
    }
}

/// Result alias for request operations.
pub type Result<T> = std::result::Result<T, Error>;
