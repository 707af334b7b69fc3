//! Content store.
//!
//! A transactional, content-addressed tree store keyed by [`Reference`].
//! [`LocalRepo`] is the on-disk implementation; callers that only need
//! commit/checkout/list go through the [`Repo`] trait.

use std::path::{Path, PathBuf};

use ll_schema::{Module, ObjectId, PackageInfo, Reference, RepoConfig};
use tracing::warn;

use crate::error::{RepoError, Result};

mod checkout;
pub mod local;
#[cfg(test)]
pub(crate) mod memory;
pub mod object;
pub mod objects;
pub mod prune;
pub mod refs;
pub mod transaction;

pub use local::LocalRepo;
pub use object::{CommitObject, DirTree, ObjectKind, TreeEntry};
pub use objects::ObjectStore;
pub use prune::PruneStats;
pub use transaction::Transaction;

/// What a commit reads its tree from.
#[derive(Debug, Clone, Copy)]
pub enum CommitSource<'a> {
    /// Walk a directory and store it as a new tree.
    Directory(&'a Path),
    /// Re-tag the tree of an existing ref.
    Ref(&'a Reference),
}

/// Storage capability consumed by the resolver, the sync engine and the
/// container front-end.
pub trait Repo: Send + Sync {
    /// Store a tree under `reference` in one transaction. On failure no ref
    /// changes.
    fn commit(&self, source: CommitSource<'_>, reference: &Reference) -> Result<()>;

    /// Copy the tree of `reference` (or the part under `sub_path`) into
    /// `target`, creating it if needed and overwriting files already there.
    fn checkout(&self, reference: &Reference, sub_path: &str, target: &Path) -> Result<()>;

    /// Every stored reference, in no particular order.
    fn list_local_refs(&self) -> Result<Vec<Reference>>;

    /// Commit id `reference` points at.
    fn resolve_rev(&self, reference: &Reference) -> Result<ObjectId>;

    /// Current process configuration.
    fn config(&self) -> &RepoConfig;

    /// Replace the configuration. A no-op when `config` equals the current one.
    fn set_config(&mut self, config: RepoConfig) -> Result<()>;

    /// Legacy direct-checkout location of `reference`.
    fn root_of_layer(&self, reference: &Reference) -> PathBuf;

    /// Check out the runtime module, then the devel module if there is one.
    ///
    /// A missing devel module (or a `sub_path` it lacks) is logged and
    /// skipped; any other devel failure is returned.
    fn checkout_all(&self, reference: &Reference, sub_path: &str, target: &Path) -> Result<()> {
        self.checkout(&reference.with_module(Module::runtime()), sub_path, target)?;

        let devel = reference.with_module(Module::devel());
        match self.checkout(&devel, sub_path, target) {
            Err(RepoError::NotFound(what)) => {
                warn!(reference = %devel, missing = %what, "devel module not checked out");
                Ok(())
            }
            other => other,
        }
    }

    /// Commit the contents of `path` under `reference`.
    fn import_directory(&self, reference: &Reference, path: &Path) -> Result<()> {
        self.commit(CommitSource::Directory(path), reference)
    }

    /// Store the tree of `old` again under `new`.
    fn import_ref(&self, old: &Reference, new: &Reference) -> Result<()> {
        self.commit(CommitSource::Ref(old), new)
    }
}

/// Read `info.json` from a checked-out or unpacked package directory.
pub fn package_info(dir: &Path) -> Result<PackageInfo> {
    let path = dir.join("info.json");
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RepoError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| RepoError::InvalidData(format!("{}: {e}", path.display())))
}
