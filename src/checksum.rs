//! Content hashes for class definitions
//!
//! A compiled schema stays valid only while the hash it was built from matches
//! the current hash of the owning project's definitions.

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 hex digest identifying one revision of a project's class definitions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from the compact JSON form of a value.
    ///
    /// Key order is the document order, so reordering classes or fields
    /// yields a different hash.
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self::from_bytes(value.to_string().as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
