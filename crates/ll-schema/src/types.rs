//! Package metadata, remote search results and repository configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Architecture, ConfigError, Reference, ReferenceError, Version};

/// Package metadata as found in `info.json` at the root of a checked-out or
/// unpacked package tree, and embedded in layer archives.
///
/// Unknown keys are kept in [`extra`](Self::extra) so a read/write cycle does
/// not drop fields written by newer tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PackageInfo {
    /// Package identity (`org.deepin.calculator`).
    pub appid: String,

    /// Human readable name.
    #[serde(default)]
    pub name: String,

    /// Version string, normally `major.minor.patch[.tweak]`.
    pub version: String,

    /// Architectures this build targets.
    #[serde(default)]
    pub arch: Vec<String>,

    /// `app`, `runtime` or `base`.
    #[serde(default)]
    pub kind: String,

    /// Distribution channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Module the tree belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Base layer this package runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Runtime layer this package runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    /// Installed size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Entry point command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageInfo {
    /// Build the reference this metadata describes.
    ///
    /// Uses the first listed architecture and fills channel and module with
    /// their defaults when absent.
    ///
    /// # Errors
    ///
    /// Fails when the version or architecture cannot be parsed, or no
    /// architecture is listed.
    pub fn reference(&self) -> Result<Reference, ReferenceError> {
        let arch: Architecture = self
            .arch
            .first()
            .ok_or_else(|| ReferenceError::Architecture(String::new()))?
            .parse()?;
        let mut reference = Reference::new(&self.appid, Version::parse(&self.version)?, arch);
        if let Some(channel) = &self.channel {
            reference = reference.with_channel(channel);
        }
        if let Some(module) = &self.module {
            reference = reference.with_module(crate::Module::new(module.as_str())?);
        }
        Ok(reference)
    }
}

/// One candidate returned by the remote catalog's fuzzy search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePackage {
    /// Package identity.
    #[serde(rename = "appId", alias = "appid", alias = "id")]
    pub app_id: String,

    /// Human readable name.
    #[serde(default)]
    pub name: String,

    /// Version as reported by the server; may be unparseable.
    pub version: String,

    /// Architecture token as reported by the server; may be unknown.
    #[serde(alias = "architecture")]
    pub arch: String,

    /// Channel the candidate lives on.
    #[serde(default)]
    pub channel: String,

    /// Module, when the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl RemotePackage {
    /// Convert into a concrete reference, using `fallback_channel` when the
    /// server omitted one.
    ///
    /// # Errors
    ///
    /// Fails when the version or architecture field does not parse.
    pub fn to_reference(&self, fallback_channel: &str) -> Result<Reference, ReferenceError> {
        let channel = if self.channel.is_empty() {
            fallback_channel
        } else {
            &self.channel
        };
        let mut reference = Reference::new(
            &self.app_id,
            Version::parse(&self.version)?,
            self.arch.parse()?,
        )
        .with_channel(channel);
        if let Some(module) = &self.module {
            reference = reference.with_module(crate::Module::new(module.as_str())?);
        }
        Ok(reference)
    }
}

/// Name of the remote configured out of the box.
pub const DEFAULT_REPO_NAME: &str = "stable";

/// Endpoint of the remote configured out of the box.
pub const DEFAULT_REPO_URL: &str = "https://mirror-repo-linglong.deepin.com";

/// Process configuration: which remote to use and where each remote lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Schema version; only `1` is understood.
    pub version: u32,

    /// Name of the remote used when none is given.
    #[serde(rename = "defaultRepo")]
    pub default_repo: String,

    /// Remote name to endpoint URL.
    pub repos: BTreeMap<String, String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        let mut repos = BTreeMap::new();
        repos.insert(DEFAULT_REPO_NAME.to_string(), DEFAULT_REPO_URL.to_string());
        Self {
            version: 1,
            default_repo: DEFAULT_REPO_NAME.to_string(),
            repos,
        }
    }
}

impl RepoConfig {
    /// Check the schema version and that the default remote exists.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedVersion`] or [`ConfigError::UnknownDefault`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        if !self.repos.contains_key(&self.default_repo) {
            return Err(ConfigError::UnknownDefault(self.default_repo.clone()));
        }
        Ok(())
    }

    /// URL of the default remote.
    pub fn default_url(&self) -> Option<&str> {
        self.repos.get(&self.default_repo).map(String::as_str)
    }
}
