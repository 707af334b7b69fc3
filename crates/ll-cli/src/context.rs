//! Per-invocation state: data root, configuration and the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use ll_core::config::load_or_default;
use ll_core::paths::{Layout, try_ll_root};
use ll_core::remote::HttpRemote;
use ll_core::store::{LocalRepo, Repo};
use ll_core::sync::SyncEngine;
use ll_core::{NullReporter, Reporter};
use ll_schema::RepoConfig;

use crate::ui::TerminalReporter;

#[derive(Debug, Clone)]
pub struct Context {
    layout: Layout,
    quiet: bool,
}

impl Context {
    /// Resolve the data root from `--root`, `LL_ROOT` or `~/.ll`.
    pub fn new(root: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let root = root
            .or_else(try_ll_root)
            .ok_or_else(|| anyhow!("cannot determine data root; pass --root or set LL_ROOT"))?;
        Ok(Self {
            layout: Layout::new(root),
            quiet,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn config(&self) -> Result<RepoConfig> {
        load_or_default(&self.layout.config_file())
            .with_context(|| format!("loading {}", self.layout.config_file().display()))
    }

    pub fn open_repo(&self) -> Result<LocalRepo> {
        let config = self.config()?;
        LocalRepo::open(self.root(), config)
            .with_context(|| format!("opening store under {}", self.root().display()))
    }

    pub fn reporter(&self) -> Arc<dyn Reporter> {
        if self.quiet {
            Arc::new(NullReporter)
        } else {
            Arc::new(TerminalReporter::default())
        }
    }

    pub fn engine(&self) -> Result<SyncEngine> {
        let repo = self.open_repo()?;
        let endpoint = repo
            .config()
            .default_url()
            .ok_or_else(|| anyhow!("default remote has no URL"))?
            .to_string();
        let remote = HttpRemote::new(&endpoint)?;
        Ok(SyncEngine::new(repo, Box::new(remote)).with_reporter(self.reporter()))
    }
}
