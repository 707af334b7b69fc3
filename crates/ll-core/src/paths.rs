use dirs::home_dir;
use std::path::{Path, PathBuf};

use ll_schema::Reference;

/// Environment variable overriding the data root.
pub const ROOT_ENV: &str = "LL_ROOT";

/// Returns the data root from `LL_ROOT`, else `~/.ll`, or None if the user's
/// home cannot be resolved.
pub fn try_ll_root() -> Option<PathBuf> {
    if let Ok(val) = std::env::var(ROOT_ENV) {
        if !val.is_empty() {
            return Some(PathBuf::from(val));
        }
    }
    home_dir().map(|h| h.join(".ll"))
}

/// On-disk layout under one data root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content store: `<root>/repo`
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("repo")
    }

    /// Process configuration: `<root>/config.yaml`
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// Legacy direct-checkout tree: `<root>/layers`
    pub fn layers_dir(&self) -> PathBuf {
        self.root.join("layers")
    }

    /// `<root>/layers/<channel>/<appId>`
    pub fn app_layers_dir(&self, channel: &str, app_id: &str) -> PathBuf {
        self.layers_dir().join(channel).join(app_id)
    }

    /// `<root>/layers/<channel>/<appId>/<version>/<arch>`
    pub fn layer_dir(&self, reference: &Reference) -> PathBuf {
        self.app_layers_dir(&reference.channel, &reference.app_id)
            .join(reference.version.to_string())
            .join(reference.arch.as_str())
    }

    /// Scratch space: `<root>/cache`
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Push staging area: `<root>/cache/push`
    pub fn push_staging_dir(&self) -> PathBuf {
        self.cache_dir().join("push")
    }
}
