//! Type-safe wrapper for attribute names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type-safe wrapper for attribute names.
///
/// Attribute names preserve their case and key both pending attribute tables
/// and resolved schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeName(String);

impl AttributeName {
    /// Creates a new AttributeName from a string.
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the attribute name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner String.
    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AttributeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AttributeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AttributeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
