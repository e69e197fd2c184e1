//! Lookup identifiers and scopes.
//!
//! A `ReferenceKey` can only be obtained through [`ReferenceKey::parse`], so
//! every key that reaches a store or an upstream source is already
//! normalized: separators stripped, digits only, 9 to 12 characters.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum number of digits in a normalized key.
pub const MIN_KEY_DIGITS: usize = 9;

/// Maximum number of digits in a normalized key.
pub const MAX_KEY_DIGITS: usize = 12;

/// A normalized external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceKey(String);

impl ReferenceKey {
    /// Normalize and validate a raw identifier.
    ///
    /// Dashes and whitespace are removed. The remainder must be ASCII digits
    /// with a length between [`MIN_KEY_DIGITS`] and [`MAX_KEY_DIGITS`].
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .collect();

        if cleaned.is_empty() {
            return Err(ValidationError::InvalidKey {
                raw: raw.to_string(),
                reason: "identifier is empty".to_string(),
            });
        }

        if !cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidKey {
                raw: raw.to_string(),
                reason: "identifier must contain only digits".to_string(),
            });
        }

        if cleaned.len() < MIN_KEY_DIGITS || cleaned.len() > MAX_KEY_DIGITS {
            return Err(ValidationError::InvalidKey {
                raw: raw.to_string(),
                reason: format!(
                    "identifier must have {} to {} digits, got {}",
                    MIN_KEY_DIGITS,
                    MAX_KEY_DIGITS,
                    cleaned.len()
                ),
            });
        }

        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReferenceKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferenceKey> for String {
    fn from(key: ReferenceKey) -> Self {
        key.0
    }
}

/// Tenant or organization identifier. Entries never cross scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(scope: impl Into<String>) -> Result<Self, ValidationError> {
        let scope = scope.into();
        if scope.trim().is_empty() {
            return Err(ValidationError::EmptyScope);
        }
        Ok(Self(scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ScopeId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScopeId> for String {
    fn from(scope: ScopeId) -> Self {
        scope.0
    }
}
