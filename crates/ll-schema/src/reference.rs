//! Package references.
//!
//! A [`Reference`] names exactly one stored tree:
//! `channel:appId/version/arch/module`. A [`FuzzyReference`] is the query form
//! with everything after the app id optional.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Architecture, ReferenceError, Version};

/// Channel used when a reference does not name one.
pub const DEFAULT_CHANNEL: &str = "main";

/// Legacy channel tried when nothing is found on [`DEFAULT_CHANNEL`].
pub const FALLBACK_CHANNEL: &str = "linglong";

fn valid_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains(['/', ':']) && !s.chars().any(char::is_whitespace)
}

/// A named partition of one package release.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Module(String);

impl Module {
    /// Files needed to run the package.
    pub const RUNTIME: &'static str = "runtime";
    /// Headers and development files.
    pub const DEVEL: &'static str = "devel";
    /// Standalone binary module.
    pub const BINARY: &'static str = "binary";

    /// Validate a module name.
    ///
    /// # Errors
    ///
    /// Rejects empty names and names containing `/`, `:` or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, ReferenceError> {
        let name = name.into();
        if valid_segment(&name) {
            Ok(Self(name))
        } else {
            Err(ReferenceError::Module(name))
        }
    }

    /// The `runtime` module.
    pub fn runtime() -> Self {
        Self(Self::RUNTIME.to_string())
    }

    /// The `devel` module.
    pub fn devel() -> Self {
        Self(Self::DEVEL.to_string())
    }

    /// Module name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::runtime()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Module {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Module> for String {
    fn from(m: Module) -> Self {
        m.0
    }
}

/// Identifies one package variant.
///
/// The five fields together are the key of a stored tree. References are
/// immutable; the `with_*` helpers return modified copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
    /// Distribution channel.
    pub channel: String,
    /// Stable package identity, e.g. `org.deepin.calculator`.
    pub app_id: String,
    /// Package version.
    pub version: Version,
    /// Target architecture.
    pub arch: Architecture,
    /// Module of the release.
    pub module: Module,
}

impl Reference {
    /// Build a `main`-channel runtime reference.
    pub fn new(app_id: impl Into<String>, version: Version, arch: Architecture) -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            app_id: app_id.into(),
            version,
            arch,
            module: Module::runtime(),
        }
    }

    /// Parse `[channel:]appId/version/arch[/module]`.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::Malformed`] on a wrong number of segments or an
    /// empty segment, and the field-specific variants for a bad version,
    /// architecture or module.
    ///
    /// # Example
    ///
    /// ```
    /// use ll_schema::Reference;
    ///
    /// let r = Reference::parse("org.deepin.demo/1.2.0/x86_64").unwrap();
    /// assert_eq!(r.to_string(), "main:org.deepin.demo/1.2.0/x86_64/runtime");
    /// ```
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        let malformed = || ReferenceError::Malformed(s.to_string());

        let (channel, rest) = match s.split_once(':') {
            Some((channel, rest)) => (channel, rest),
            None => (DEFAULT_CHANNEL, s),
        };
        if !valid_segment(channel) {
            return Err(malformed());
        }

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(malformed());
        }
        if !valid_segment(parts[0]) {
            return Err(malformed());
        }

        let module = match parts.get(3) {
            Some(m) => Module::new(*m)?,
            None => Module::runtime(),
        };

        Ok(Self {
            channel: channel.to_string(),
            app_id: parts[0].to_string(),
            version: Version::parse(parts[1])?,
            arch: parts[2].parse()?,
            module,
        })
    }

    /// `channel:appId/version/arch/module`.
    pub fn to_canonical_string(&self) -> String {
        format!(
            "{}:{}/{}/{}/{}",
            self.channel, self.app_id, self.version, self.arch, self.module
        )
    }

    /// `channel/appId/version/arch/module`, the key refs are stored under.
    pub fn to_store_ref(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.channel, self.app_id, self.version, self.arch, self.module
        )
    }

    /// Parse the form produced by [`to_store_ref`](Self::to_store_ref).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`parse`](Self::parse); exactly five segments are required.
    pub fn from_store_ref(s: &str) -> Result<Self, ReferenceError> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 5 || !valid_segment(parts[0]) || !valid_segment(parts[1]) {
            return Err(ReferenceError::Malformed(s.to_string()));
        }
        Ok(Self {
            channel: parts[0].to_string(),
            app_id: parts[1].to_string(),
            version: Version::parse(parts[2])?,
            arch: parts[3].parse()?,
            module: Module::new(parts[4])?,
        })
    }

    /// Copy with another module.
    pub fn with_module(&self, module: Module) -> Self {
        Self {
            module,
            ..self.clone()
        }
    }

    /// Copy with another channel.
    pub fn with_channel(&self, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..self.clone()
        }
    }
}

impl Ord for Reference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.module.cmp(&other.module))
            .then_with(|| self.arch.cmp(&other.arch))
            .then_with(|| self.channel.cmp(&other.channel))
            .then_with(|| self.app_id.cmp(&other.app_id))
    }
}

impl PartialOrd for Reference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Reference {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Reference> for String {
    fn from(r: Reference) -> Self {
        r.to_canonical_string()
    }
}

/// A reference pattern used for lookups. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuzzyReference {
    /// Channel, if pinned.
    pub channel: Option<String>,
    /// Package identity; always present.
    pub app_id: String,
    /// Version or version prefix such as `1.2`.
    pub version: Option<String>,
    /// Architecture, if pinned.
    pub arch: Option<Architecture>,
}

impl FuzzyReference {
    /// Pattern matching every version of `app_id` on any channel.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Parse `[channel:]appId[/version[/arch]]`.
    ///
    /// The version may be left empty when an architecture follows
    /// (`appId//arch`), which pins the architecture alone.
    ///
    /// # Errors
    ///
    /// Fails on other empty segments, too many segments, a version prefix
    /// that is not made of dot-separated digits, or an unknown architecture.
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        let malformed = || ReferenceError::Malformed(s.to_string());

        let (channel, rest) = match s.split_once(':') {
            Some((channel, rest)) => {
                if !valid_segment(channel) {
                    return Err(malformed());
                }
                (Some(channel.to_string()), rest)
            }
            None => (None, s),
        };

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() > 3 || !valid_segment(parts[0]) {
            return Err(malformed());
        }

        let version = match parts.get(1) {
            Some(v) if v.is_empty() && parts.len() == 3 => None,
            Some(v) if v.is_empty() => return Err(malformed()),
            Some(v) => {
                if !v.split('.').all(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit())) {
                    return Err(ReferenceError::Version((*v).to_string()));
                }
                Some((*v).to_string())
            }
            None => None,
        };

        let arch = match parts.get(2) {
            Some(a) => Some(a.parse()?),
            None => None,
        };

        Ok(Self {
            channel,
            app_id: parts[0].to_string(),
            version,
            arch,
        })
    }

    /// Channel to query, defaulting to `main`.
    pub fn channel_or_default(&self) -> &str {
        self.channel.as_deref().unwrap_or(DEFAULT_CHANNEL)
    }

    /// Whether the version pins a tweak component (`a.b.c.d`).
    pub fn has_tweak(&self) -> bool {
        self.version
            .as_deref()
            .and_then(|v| Version::parse(v).ok())
            .is_some_and(|v| v.tweak.is_some())
    }

    /// Whether `reference` satisfies every field this pattern pins.
    ///
    /// The version matches textually as a prefix.
    pub fn matches(&self, reference: &Reference) -> bool {
        reference.app_id == self.app_id
            && self.channel.as_deref().is_none_or(|c| c == reference.channel)
            && self.arch.is_none_or(|a| a == reference.arch)
            && self
                .version
                .as_deref()
                .is_none_or(|v| reference.version.has_prefix(v))
    }
}

impl fmt::Display for FuzzyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{channel}:")?;
        }
        f.write_str(&self.app_id)?;
        match (&self.version, &self.arch) {
            (Some(version), Some(arch)) => write!(f, "/{version}/{arch}"),
            (Some(version), None) => write!(f, "/{version}"),
            (None, Some(arch)) => write!(f, "//{arch}"),
            (None, None) => Ok(()),
        }
    }
}

impl FromStr for FuzzyReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
