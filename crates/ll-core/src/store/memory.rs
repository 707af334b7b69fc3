//! In-memory [`Repo`] used by tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ll_schema::{ObjectId, Reference, RepoConfig};
use walkdir::WalkDir;

use super::{CommitSource, Repo};
use crate::error::{RepoError, Result};

type Tree = BTreeMap<PathBuf, Vec<u8>>;

/// Keeps whole trees in a map; files only, no modes or links.
#[derive(Debug, Default)]
pub(crate) struct MemoryRepo {
    trees: Mutex<HashMap<Reference, Tree>>,
    config: RepoConfig,
}

impl MemoryRepo {
    /// Insert a tree without going through `commit`.
    pub(crate) fn insert(&self, reference: Reference, files: &[(&str, &str)]) {
        let tree = files
            .iter()
            .map(|(p, c)| (PathBuf::from(p), c.as_bytes().to_vec()))
            .collect();
        self.trees.lock().unwrap().insert(reference, tree);
    }
}

impl Repo for MemoryRepo {
    fn commit(&self, source: CommitSource<'_>, reference: &Reference) -> Result<()> {
        let tree = match source {
            CommitSource::Directory(dir) => {
                let mut tree = Tree::new();
                for entry in WalkDir::new(dir) {
                    let entry = entry?;
                    if entry.file_type().is_file() {
                        let rel = entry.path().strip_prefix(dir).unwrap().to_path_buf();
                        tree.insert(rel, std::fs::read(entry.path())?);
                    }
                }
                tree
            }
            CommitSource::Ref(src) => self
                .trees
                .lock()
                .unwrap()
                .get(src)
                .cloned()
                .ok_or_else(|| RepoError::NotFound(src.to_string()))?,
        };
        self.trees.lock().unwrap().insert(reference.clone(), tree);
        Ok(())
    }

    fn checkout(&self, reference: &Reference, sub_path: &str, target: &Path) -> Result<()> {
        let trees = self.trees.lock().unwrap();
        let tree = trees
            .get(reference)
            .ok_or_else(|| RepoError::NotFound(reference.to_string()))?;
        let prefix = Path::new(sub_path.trim_start_matches('/'));
        std::fs::create_dir_all(target)?;
        for (path, content) in tree {
            let Ok(rel) = path.strip_prefix(prefix) else {
                continue;
            };
            let dest = target.join(rel);
            std::fs::create_dir_all(dest.parent().unwrap())?;
            std::fs::write(dest, content)?;
        }
        Ok(())
    }

    fn list_local_refs(&self) -> Result<Vec<Reference>> {
        Ok(self.trees.lock().unwrap().keys().cloned().collect())
    }

    fn resolve_rev(&self, reference: &Reference) -> Result<ObjectId> {
        if self.trees.lock().unwrap().contains_key(reference) {
            Ok(ObjectId::compute(reference.to_string().as_bytes()))
        } else {
            Err(RepoError::NotFound(reference.to_string()))
        }
    }

    fn config(&self) -> &RepoConfig {
        &self.config
    }

    fn set_config(&mut self, config: RepoConfig) -> Result<()> {
        self.config = config;
        Ok(())
    }

    fn root_of_layer(&self, reference: &Reference) -> PathBuf {
        PathBuf::from("/layers").join(reference.to_store_ref())
    }
}
