//! Ref storage: `refs/heads/<channel>/<appId>/<version>/<arch>/<module>`,
//! each a text file holding a commit id.

use std::fs;
use std::path::{Path, PathBuf};

use ll_schema::ObjectId;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{RepoError, Result};
use crate::fsutil::write_atomic;

/// The `refs/heads` directory of one store.
#[derive(Debug, Clone)]
pub struct RefStore {
    heads: PathBuf,
}

impl RefStore {
    /// Ref directory under `repo_dir`.
    pub fn new(repo_dir: &Path) -> Self {
        Self {
            heads: repo_dir.join("refs").join("heads"),
        }
    }

    fn path(&self, store_ref: &str) -> Result<PathBuf> {
        if store_ref.is_empty()
            || store_ref
                .split('/')
                .any(|c| c.is_empty() || c == "." || c == "..")
        {
            return Err(RepoError::InvalidData(format!("invalid ref '{store_ref}'")));
        }
        Ok(self.heads.join(store_ref))
    }

    /// Commit a ref points at, if the ref exists.
    pub fn read(&self, store_ref: &str) -> Result<Option<ObjectId>> {
        let path = self.path(store_ref)?;
        match fs::read_to_string(&path) {
            Ok(content) => ObjectId::parse(content.trim())
                .map(Some)
                .map_err(RepoError::InvalidData),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::IsADirectory => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Point a ref at a commit.
    pub fn write(&self, store_ref: &str, id: &ObjectId) -> Result<()> {
        write_atomic(&self.path(store_ref)?, format!("{id}\n").as_bytes())
    }

    /// Remove a ref and any directories it leaves empty.
    pub fn delete(&self, store_ref: &str) -> Result<()> {
        let path = self.path(store_ref)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.heads || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    /// All refs with their commits. Unreadable ref files are skipped.
    pub fn list(&self) -> Result<Vec<(String, ObjectId)>> {
        let mut refs = Vec::new();
        if !self.heads.exists() {
            return Ok(refs);
        }
        for entry in WalkDir::new(&self.heads).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.heads) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            match self.read(&name) {
                Ok(Some(id)) => refs.push((name, id)),
                Ok(None) => {}
                Err(e) => warn!(store_ref = %name, error = %e, "skipping unreadable ref"),
            }
        }
        Ok(refs)
    }
}
