//! Object model of the content store.
//!
//! Three kinds of object, each named by the BLAKE3 hash of its bytes:
//! file content, directory trees and commits. Trees and commits are stored as
//! compact JSON with entries sorted by name, so the same tree always hashes to
//! the same id.

use ll_schema::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, Result};

/// Kind of a stored object; selects the file extension on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Raw file content.
    File,
    /// Directory listing.
    DirTree,
    /// Commit pointing at a root tree.
    Commit,
}

impl ObjectKind {
    /// On-disk extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::DirTree => "dirtree",
            Self::Commit => "commit",
        }
    }

    /// Inverse of [`extension`](Self::extension).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "file" => Some(Self::File),
            "dirtree" => Some(Self::DirTree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }

    /// Trees and commits count as metadata for progress reporting.
    pub fn is_metadata(self) -> bool {
        !matches!(self, Self::File)
    }
}

/// Reduce a mode to its canonical stored form: owner bits kept, group and
/// other get the owner's read and execute bits.
///
/// `0o600` becomes `0o644`, `0o700` becomes `0o755`.
pub fn canonical_mode(mode: u32) -> u32 {
    let owner = mode & 0o700;
    let rx = (owner >> 6) & 0o5;
    owner | (rx << 3) | rx
}

/// One child of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeEntry {
    /// Regular file.
    File {
        /// Entry name.
        name: String,
        /// Canonical permission bits.
        mode: u32,
        /// Content object.
        id: ObjectId,
    },
    /// Subdirectory.
    Dir {
        /// Entry name.
        name: String,
        /// Canonical permission bits.
        mode: u32,
        /// Tree object.
        id: ObjectId,
    },
    /// Symbolic link; the target is stored inline.
    Symlink {
        /// Entry name.
        name: String,
        /// Link target, not resolved.
        target: String,
    },
}

impl TreeEntry {
    /// Entry name.
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Dir { name, .. } | Self::Symlink { name, .. } => name,
        }
    }
}

/// Directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirTree {
    /// Children, sorted by name.
    pub entries: Vec<TreeEntry>,
}

impl DirTree {
    /// Build a tree, sorting entries by name.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Self { entries }
    }

    /// Look up a child by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Canonical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse canonical bytes.
    ///
    /// # Errors
    ///
    /// `InvalidData` on malformed JSON, on an entry name that is empty, `.`,
    /// `..` or contains `/` or NUL, and on entries that are not strictly
    /// sorted by name.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tree: Self = serde_json::from_slice(bytes)
            .map_err(|e| RepoError::InvalidData(format!("corrupt dirtree: {e}")))?;
        tree.validate()?;
        Ok(tree)
    }

    fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            let name = entry.name();
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
                return Err(RepoError::InvalidData(format!(
                    "invalid tree entry name '{}'",
                    name.escape_debug()
                )));
            }
        }
        if let Some(pair) = self
            .entries
            .windows(2)
            .find(|w| w[0].name() >= w[1].name())
        {
            return Err(RepoError::InvalidData(format!(
                "tree entries out of order at '{}'",
                pair[1].name().escape_debug()
            )));
        }
        Ok(())
    }
}

/// Commit object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    /// Root directory tree.
    pub root: ObjectId,
    /// Previous commit of the same ref, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectId>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// One-line description.
    pub subject: String,
}

impl CommitObject {
    /// Canonical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RepoError::InvalidData(format!("corrupt commit: {e}")))
    }
}
