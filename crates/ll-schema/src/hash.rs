//! Content identifiers for stored objects.

use serde::{Deserialize, Deserializer, Serialize};

/// BLAKE3 digest that names an object in the content store.
///
/// Always 64 lowercase hex characters. Validation happens at construction and
/// at deserialization, so an `ObjectId` read back from disk is trusted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Compute the id of a byte buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Wrap a finished hasher.
    pub fn from_hasher(hasher: &blake3::Hasher) -> Self {
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Parse a hex digest.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when `s` is not exactly 64 hex characters.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(format!(
                "invalid object id: expected 64 hex chars, got '{s}'"
            ))
        }
    }

    /// Hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character fan-out directory used by the object store.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// Remainder after [`prefix`](Self::prefix).
    pub fn suffix(&self) -> &str {
        &self.0[2..]
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
