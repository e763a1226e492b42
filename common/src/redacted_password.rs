//! Control password handling with redacted Debug output.

use crate::{ErrorLocation, RedactError};

use std::fmt;
use std::panic::Location;

use serde::ser::Error;
use zeroize::Zeroize;

/// A control-port password that never exposes its value in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedPassword {
    inner: String,
}

impl RedactedPassword {
    /// Create a new redacted password.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            inner: password.into(),
        }
    }

    /// Build a password from optional user input, treating blank input as absent.
    pub fn from_input(input: Option<String>) -> Option<Self> {
        input.filter(|s| !s.is_empty()).map(Self::new)
    }

    /// Get the actual password value.
    ///
    /// # Security Note
    /// Only call this when handing the password to the daemon (hashing or AUTHENTICATE).
    #[inline]
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Get the password length (safe to log).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the password is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for RedactedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedPassword([REDACTED])")
    }
}

impl fmt::Display for RedactedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED PASSWORD]")
    }
}

impl Drop for RedactedPassword {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

// Prevent accidental serialization
impl serde::Serialize for RedactedPassword {
    fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Err(S::Error::custom(RedactError::Serialization {
            message: String::from("RedactedPassword cannot be serialized - use expose() explicitly"),
            location: ErrorLocation::from(Location::caller()),
        }))
    }
}
