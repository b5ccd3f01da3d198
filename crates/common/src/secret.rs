//! Redacting wrapper for credentials held in memory

use std::fmt;
use zeroize::Zeroize;

/// What `Debug` and `Display` print in place of a secret.
pub const REDACTED: &str = "[REDACTED]";

/// Credential material that never reaches logs.
///
/// Formatting prints `REDACTED`; the buffer is wiped when the value drops.
/// Equality compares the wrapped values so stores can be asserted on in tests.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Callers must not log it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_is_redacted_when_formatted() {
        let token = Secret::new(String::from("eyJhbGciOi.payload.sig"));
        assert_eq!(format!("{token:?}"), REDACTED);
        assert_eq!(format!("{token}"), REDACTED);
        assert_eq!(format!("{:?}", Some(&token)), "Some([REDACTED])");
    }

    #[test]
    fn expose_returns_inner_value() {
        let token: Secret<String> = String::from("eyJhbGciOi.payload.sig").into();
        assert_eq!(token.expose(), "eyJhbGciOi.payload.sig");
    }

    #[test]
    fn equality_compares_inner_values() {
        let a = Secret::new(String::from("at_1"));
        assert_eq!(a, a.clone());
        assert_ne!(a, Secret::new(String::from("at_2")));
    }
}
