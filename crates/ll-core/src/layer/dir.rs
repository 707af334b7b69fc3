//! Package directories with optional scoped ownership.

use std::path::{Path, PathBuf};

use ll_schema::PackageInfo;
use tracing::warn;

use crate::error::Result;
use crate::store::package_info;

/// A directory holding one package tree (`info.json` plus files).
///
/// An owning `LayerDir` deletes its directory when dropped. Call
/// [`set_clean_status(false)`](Self::set_clean_status) to keep it.
#[derive(Debug)]
pub struct LayerDir {
    path: PathBuf,
    cleanup: bool,
}

impl LayerDir {
    /// Wrap `path` without taking ownership.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cleanup: false,
        }
    }

    /// Wrap `path` and delete it on drop.
    pub fn owned(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cleanup: true,
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata from `info.json`.
    pub fn info(&self) -> Result<PackageInfo> {
        package_info(&self.path)
    }

    /// Raw `info.json` bytes.
    pub fn raw_info(&self) -> Result<Vec<u8>> {
        // parse first so callers get InvalidData on garbage
        self.info()?;
        Ok(std::fs::read(self.path.join("info.json"))?)
    }

    /// Whether drop deletes the directory.
    pub fn set_clean_status(&mut self, cleanup: bool) {
        self.cleanup = cleanup;
    }

    /// Give up ownership and return the path.
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for LayerDir {
    fn drop(&mut self) {
        if !self.cleanup {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove layer dir");
            }
        }
    }
}
