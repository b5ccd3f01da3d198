//! Session credential library for the board API client
//!
//! Holds the short-lived access credential and the backend wire types that
//! produce it. This crate performs no HTTP; the `api-client` crate drives the
//! endpoints and writes results here.
//!
//! Credential lifecycle:
//! 1. `CredentialStore::load()` restores a persisted session and flips readiness
//! 2. Login stores a credential via `CredentialStore::set()`
//! 3. The request dispatcher reads it via `CredentialStore::get()` per request
//! 4. The refresh coordinator replaces it after a renewal, or calls
//!    `CredentialStore::clear()` when renewal fails (forced logout)
//! 5. Observers see the logout through `CredentialStore::subscribe()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{AccessCredential, CredentialStore, write_private_file};
pub use error::{Error, Result};
pub use token::{
    ApiEnvelope, LoginRequest, SignupRequest, TokenPayload, envelope_message, parse_envelope,
    parse_token_envelope,
};
