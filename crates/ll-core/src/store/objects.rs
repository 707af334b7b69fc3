//! Content-addressed object directory.
//!
//! Objects live at `objects/<2-hex prefix>/<id>.<kind>`. A store may name a
//! parent store; reads fall back to it when an object is absent locally, writes
//! never touch it.

use std::fs;
use std::path::{Path, PathBuf};

use ll_schema::ObjectId;
use walkdir::WalkDir;

use super::object::ObjectKind;
use crate::config::StoreConfig;
use crate::error::{RepoError, Result};

/// Object directory of one store, plus its parent chain.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    parent: Option<Box<ObjectStore>>,
}

/// One object found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object id.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Size in bytes.
    pub size: u64,
}

impl ObjectStore {
    /// Object directory at `root` with no parent.
    pub fn with_root(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root, parent: None })
    }

    /// Open the objects of the store at `repo_dir`, following its configured
    /// parent chain.
    pub fn for_repo(repo_dir: &Path) -> Result<Self> {
        let config = StoreConfig::load(repo_dir)?;
        let parent = match config.core.parent {
            Some(parent_dir) => Some(Box::new(Self::for_repo(&parent_dir)?)),
            None => None,
        };
        Ok(Self {
            root: repo_dir.join("objects"),
            parent,
        })
    }

    /// Attach a parent store.
    pub fn with_parent(mut self, parent: ObjectStore) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Local path of an object, whether or not it exists.
    /// Uses 2-char prefix: ab/abcdef123....file
    pub fn object_path(&self, id: &ObjectId, kind: ObjectKind) -> PathBuf {
        self.root
            .join(id.prefix())
            .join(format!("{id}.{}", kind.extension()))
    }

    /// Present in this store, ignoring the parent.
    pub fn contains_local(&self, id: &ObjectId, kind: ObjectKind) -> bool {
        self.object_path(id, kind).exists()
    }

    /// Present here or anywhere up the parent chain.
    pub fn contains(&self, id: &ObjectId, kind: ObjectKind) -> bool {
        self.contains_local(id, kind)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.contains(id, kind))
    }

    /// Path of the first copy of an object found along the parent chain.
    pub fn locate(&self, id: &ObjectId, kind: ObjectKind) -> Result<PathBuf> {
        let path = self.object_path(id, kind);
        if path.exists() {
            return Ok(path);
        }
        match &self.parent {
            Some(parent) => parent.locate(id, kind),
            None => Err(RepoError::NotFound(format!(
                "object {id}.{}",
                kind.extension()
            ))),
        }
    }

    /// Read an object's bytes.
    pub fn read(&self, id: &ObjectId, kind: ObjectKind) -> Result<Vec<u8>> {
        Ok(fs::read(self.locate(id, kind)?)?)
    }

    /// Move a staged file into place. An already present object is kept and
    /// the staged copy discarded.
    pub fn insert_staged(&self, staged: &Path, id: &ObjectId, kind: ObjectKind) -> Result<()> {
        let target = self.object_path(id, kind);
        if target.exists() {
            fs::remove_file(staged)?;
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staged, &target)?;
        Ok(())
    }

    /// Delete a local object. Returns the bytes freed.
    pub fn remove(&self, id: &ObjectId, kind: ObjectKind) -> Result<u64> {
        let path = self.object_path(id, kind);
        let size = fs::metadata(&path)?.len();
        fs::remove_file(&path)?;
        Ok(size)
    }

    /// Every object stored locally. Stray files are skipped.
    pub fn list_local(&self) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        if !self.root.exists() {
            return Ok(objects);
        }
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let kind = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(ObjectKind::from_extension);
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| ObjectId::parse(s).ok());
            if let (Some(id), Some(kind)) = (id, kind) {
                objects.push(StoredObject {
                    id,
                    kind,
                    size: entry.metadata()?.len(),
                });
            }
        }
        Ok(objects)
    }
}
