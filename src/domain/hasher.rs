use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashFormatError {
    #[error("Hash cannot be empty")]
    Empty,

    #[error("Invalid hash format: must be 64 hexadecimal characters, got {0:?}")]
    Malformed(String),
}

/// Hex-encoded SHA-256 digest of a document's bytes.
///
/// Always stored in lowercase so that the same document maps to exactly one
/// registry key regardless of how the hash was typed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

/// Compute the content digest of an in-memory buffer.
pub fn digest(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    ContentHash(hex::encode(hasher.finalize()))
}

impl ContentHash {
    /// Parse user or wire input. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, HashFormatError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(HashFormatError::Empty);
        }

        if trimmed.len() != HASH_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashFormatError::Malformed(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `content` digests to this hash.
    pub fn matches(&self, content: &[u8]) -> bool {
        digest(content) == *self
    }

    /// Short prefix for log lines and default file names
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentHash {
    type Err = HashFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
