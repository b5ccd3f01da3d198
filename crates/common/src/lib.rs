//! Common types for the board client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{REDACTED, Secret};
