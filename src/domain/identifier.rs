//! Product identifier (ASIN) value object

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reasons a raw input cell cannot become an [`Identifier`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty after trimming")]
    Empty,

    #[error("identifier '{0}' contains non-alphanumeric characters")]
    InvalidCharacters(String),
}

/// Opaque uppercase alphanumeric product code.
///
/// Always non-empty; used as the row key and inside generated filenames,
/// which is why anything outside `[A-Z0-9]` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Trim and uppercase a raw cell value.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let value = raw.trim().to_uppercase();
        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentifierError::InvalidCharacters(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}
