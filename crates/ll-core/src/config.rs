//! Configuration files.
//!
//! Two files are involved:
//! - `<root>/config.yaml`: the process [`RepoConfig`] (default remote, remote URLs).
//! - `<root>/repo/config.toml`: the store's own [`StoreConfig`] (core options and
//!   the remote definitions the store pulls from).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ll_schema::RepoConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::fsutil::write_atomic;

/// Free space the store keeps in reserve.
pub const MIN_FREE_SPACE: &str = "600MB";

/// Load and validate `config.yaml`.
///
/// # Errors
///
/// `NotFound` if the file is absent, `InvalidData` on malformed YAML, a schema
/// version other than 1, or a default remote missing from `repos`.
pub fn load_config(path: &Path) -> Result<RepoConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let config: RepoConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load `config.yaml`, falling back to [`RepoConfig::default`] when the file
/// does not exist. Other failures are returned.
pub fn load_or_default(path: &Path) -> Result<RepoConfig> {
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(RepoError::NotFound(_)) => {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(RepoConfig::default())
        }
        Err(e) => Err(e),
    }
}

/// Validate and persist `config.yaml`.
pub fn save_config(path: &Path, config: &RepoConfig) -> Result<()> {
    config.validate()?;
    let yaml = serde_yaml::to_string(config)?;
    write_atomic(path, yaml.as_bytes())?;
    info!(path = %path.display(), default_repo = %config.default_repo, "saved config");
    Ok(())
}

/// `[core]` table of the store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSection {
    /// Storage mode tag; informational.
    pub mode: String,

    /// Free space the store keeps in reserve.
    #[serde(rename = "min-free-space-size")]
    pub min_free_space_size: String,

    /// Store consulted for objects missing locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PathBuf>,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            mode: "archive".to_string(),
            min_free_space_size: MIN_FREE_SPACE.to_string(),
            parent: None,
        }
    }
}

/// `[remote.<name>]` table of the store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Base URL of the served store (`http(s)://` or `file://`).
    pub url: String,

    /// Allow HTTP/2; disabled by default because of a proxy multiplexing defect.
    #[serde(default)]
    pub http2: bool,

    /// Signature verification; must stay off.
    #[serde(rename = "gpg-verify", default)]
    pub gpg_verify: bool,
}

impl RemoteSection {
    /// Hardened remote definition for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http2: false,
            gpg_verify: false,
        }
    }
}

/// Contents of `<repo>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Core options.
    #[serde(default)]
    pub core: CoreSection,

    /// Remotes by name.
    #[serde(default)]
    pub remote: BTreeMap<String, RemoteSection>,
}

impl StoreConfig {
    /// Read `config.toml` from a store directory.
    pub fn load(repo_dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(repo_dir.join("config.toml"))?;
        Ok(toml::from_str(&content)?)
    }

    /// Write `config.toml` into a store directory.
    pub fn save(&self, repo_dir: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        write_atomic(&repo_dir.join("config.toml"), content.as_bytes())
    }
}

/// URL the store pulls from for `name`, given the remote's endpoint.
pub fn store_url(endpoint: &str, name: &str) -> String {
    format!("{}/repos/{name}", endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let config = load_or_default(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, RepoConfig::default());
    }

    #[test]
    fn wrong_version_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "version: 2\ndefaultRepo: stable\nrepos:\n  stable: https://a\n",
        )
        .unwrap();
        assert!(matches!(load_config(&path), Err(RepoError::InvalidData(_))));
        assert!(matches!(load_or_default(&path), Err(RepoError::InvalidData(_))));
    }

    #[test]
    fn dangling_default_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "version: 1\ndefaultRepo: nightly\nrepos:\n  stable: https://a\n",
        )
        .unwrap();
        assert!(matches!(load_config(&path), Err(RepoError::InvalidData(_))));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = RepoConfig::default();
        config
            .repos
            .insert("nightly".into(), "https://nightly.example".into());
        config.default_repo = "nightly".into();
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn store_config_toml_shape() {
        let dir = tempdir().unwrap();
        let mut store = StoreConfig::default();
        store.remote.insert(
            "stable".into(),
            RemoteSection::new(store_url("https://repo.example/", "stable")),
        );
        store.save(dir.path()).unwrap();

        let text = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(text.contains("[remote.stable]"));
        assert!(text.contains("gpg-verify = false"));
        assert!(text.contains("min-free-space-size = \"600MB\""));

        let back = StoreConfig::load(dir.path()).unwrap();
        assert_eq!(back, store);
        assert_eq!(back.remote["stable"].url, "https://repo.example/repos/stable");
    }
}
