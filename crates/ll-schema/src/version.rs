//! Four-part package versions (`major.minor.patch[.tweak]`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::ReferenceError;

/// A package version.
///
/// Ordering is field-wise numeric over `(major, minor, patch, tweak)`. A version
/// without a tweak sorts before any version of the same triple that has one, so
/// `1.2.3 < 1.2.3.0 < 1.2.3.1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Optional fourth component; `None` orders below every `Some`.
    pub tweak: Option<u64>,
}

impl Version {
    /// Build a three-part version.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            tweak: None,
        }
    }

    /// Return the same version with a tweak component.
    pub fn with_tweak(mut self, tweak: u64) -> Self {
        self.tweak = Some(tweak);
        self
    }

    /// Parse `major.minor.patch` or `major.minor.patch.tweak`.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::Version`] when the component count is not three
    /// or four, or when any component is not a decimal number.
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        let invalid = || ReferenceError::Version(s.to_string());

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(invalid());
        }

        let mut numbers = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            numbers.push(part.parse::<u64>().map_err(|_| invalid())?);
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            tweak: numbers.get(3).copied(),
        })
    }

    /// Compare two versions, returning the standard three-way result.
    pub fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    /// Whether the textual form of this version starts with `prefix`.
    ///
    /// An empty prefix matches every version.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        prefix.is_empty() || self.to_string().starts_with(prefix)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(tweak) = self.tweak {
            write!(f, ".{tweak}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Pick the greatest parseable version out of a list of version strings.
///
/// Unparseable entries are ignored. Returns `None` when nothing parses.
pub fn latest_of<'a, I>(candidates: I) -> Option<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter_map(|s| Version::parse(s.trim()).ok())
        .max()
}
