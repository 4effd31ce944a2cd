//! Frame delimiter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_DELIMITER;
use crate::error::{ProtocolError, ProtocolResult};

/// Characters that may appear in compact JSON outside of string contents.
const JSON_STRUCTURAL: &[char] = &['"', '\\', '{', '}', '[', ']', ',', ':'];

/// Byte sequence terminating every frame on the wire.
///
/// Frames are never escaped, so a delimiter must not be able to appear in the
/// JSON structure of an envelope. Validation rejects the empty string and any
/// delimiter containing JSON punctuation; it cannot rule out a delimiter that
/// occurs inside a string value, so pick one that your payloads never contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Delimiter(String);

impl Delimiter {
    /// Validates and wraps a delimiter.
    pub fn new(delimiter: impl Into<String>) -> ProtocolResult<Self> {
        let delimiter = delimiter.into();

        if delimiter.is_empty() {
            return Err(ProtocolError::invalid_delimiter(
                delimiter,
                "delimiter must not be empty",
            ));
        }

        if delimiter.contains(JSON_STRUCTURAL) {
            return Err(ProtocolError::invalid_delimiter(
                delimiter,
                "delimiter must not contain JSON punctuation",
            ));
        }

        Ok(Self(delimiter))
    }

    /// Returns the delimiter text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the delimiter bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Length of the delimiter in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(DEFAULT_DELIMITER.to_string())
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Delimiter {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Delimiter {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Delimiter> for String {
    fn from(delimiter: Delimiter) -> Self {
        delimiter.0
    }
}
