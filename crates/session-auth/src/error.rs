//! Error types for session credential operations

/// Errors from credential storage and token envelope parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("invalid response envelope: {0}")]
    Envelope(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
