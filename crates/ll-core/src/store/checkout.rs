//! Importing directories into trees and materializing trees back onto disk.

use std::fs::{self, Permissions};
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Component, Path, PathBuf};

use ll_schema::ObjectId;
use tracing::warn;

use super::object::{DirTree, ObjectKind, TreeEntry, canonical_mode};
use super::objects::ObjectStore;
use super::transaction::Transaction;
use crate::error::{RepoError, Result};
use crate::fsutil::remove_any;

/// Stage `dir` and everything below it. Returns the root tree id.
///
/// Sockets, FIFOs and device nodes are skipped with a warning.
pub(crate) fn write_directory(txn: &mut Transaction<'_>, dir: &Path) -> Result<ObjectId> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().into_string().map_err(|raw| {
            RepoError::InvalidData(format!("non UTF-8 file name: {}", raw.to_string_lossy()))
        })?;
        let meta = fs::symlink_metadata(&path)?;
        let file_type = meta.file_type();
        let mode = canonical_mode(meta.permissions().mode());

        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let target = target.to_str().ok_or_else(|| {
                RepoError::InvalidData(format!("non UTF-8 link target in {}", path.display()))
            })?;
            entries.push(TreeEntry::Symlink {
                name,
                target: target.to_string(),
            });
        } else if file_type.is_dir() {
            let id = write_directory(txn, &path)?;
            entries.push(TreeEntry::Dir { name, mode, id });
        } else if file_type.is_file() {
            let id = txn.write_file(&path)?;
            entries.push(TreeEntry::File { name, mode, id });
        } else {
            warn!(path = %path.display(), "skipping special file");
        }
    }

    txn.write_tree(&DirTree::new(entries))
}

/// Load a tree object.
pub(crate) fn read_tree(objects: &ObjectStore, id: &ObjectId) -> Result<DirTree> {
    DirTree::from_bytes(&objects.read(id, ObjectKind::DirTree)?)
}

/// Copy the part of tree `root` selected by `sub_path` into `target`.
///
/// Existing files in `target` are overwritten, other existing content is
/// kept. An empty `sub_path` (or `/`) selects the whole tree; a sub path
/// naming a file copies just that file into `target`. Returns the number of
/// files written.
///
/// Directory modes are applied once every entry is written, and existing
/// directories are made owner-writable first, so a read-only directory from
/// an earlier checkout can be overlaid.
pub(crate) fn checkout_tree(
    objects: &ObjectStore,
    root: &ObjectId,
    sub_path: &str,
    target: &Path,
) -> Result<u64> {
    let mut tree = read_tree(objects, root)?;
    let mut mode = 0o755;

    let components: Vec<&str> = Path::new(sub_path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    let mut dir_modes = Vec::new();
    for (i, name) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        match tree.get(name) {
            Some(TreeEntry::Dir { id, mode: m, .. }) => {
                mode = *m;
                tree = read_tree(objects, id)?;
            }
            Some(entry @ (TreeEntry::File { .. } | TreeEntry::Symlink { .. })) if last => {
                prepare_dir(target)?;
                return materialize_entry(objects, entry, target, &mut dir_modes);
            }
            _ => return Err(RepoError::NotFound(format!("path '{sub_path}' in tree {root}"))),
        }
    }

    let written = materialize_dir(objects, &tree, mode, target, &mut dir_modes)?;
    // children were pushed before their parents
    for (path, mode) in &dir_modes {
        fs::set_permissions(path, Permissions::from_mode(*mode))?;
    }
    Ok(written)
}

/// Make `target` a writable directory, replacing anything else found there.
fn prepare_dir(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            let mode = meta.permissions().mode();
            if mode & 0o700 != 0o700 {
                fs::set_permissions(target, Permissions::from_mode(mode | 0o700))?;
            }
        }
        Ok(_) => remove_any(target)?,
        Err(_) => {}
    }
    fs::create_dir_all(target)?;
    Ok(())
}

fn materialize_dir(
    objects: &ObjectStore,
    tree: &DirTree,
    mode: u32,
    target: &Path,
    dir_modes: &mut Vec<(PathBuf, u32)>,
) -> Result<u64> {
    prepare_dir(target)?;

    let mut written = 0;
    for entry in &tree.entries {
        written += materialize_entry(objects, entry, target, dir_modes)?;
    }

    dir_modes.push((target.to_path_buf(), mode));
    Ok(written)
}

fn materialize_entry(
    objects: &ObjectStore,
    entry: &TreeEntry,
    parent: &Path,
    dir_modes: &mut Vec<(PathBuf, u32)>,
) -> Result<u64> {
    let path = parent.join(entry.name());
    match entry {
        TreeEntry::Dir { id, mode, .. } => {
            let tree = read_tree(objects, id)?;
            materialize_dir(objects, &tree, *mode, &path, dir_modes)
        }
        TreeEntry::File { id, mode, .. } => {
            remove_any(&path)?;
            fs::copy(objects.locate(id, ObjectKind::File)?, &path)?;
            fs::set_permissions(&path, Permissions::from_mode(*mode))?;
            Ok(1)
        }
        TreeEntry::Symlink { target, .. } => {
            remove_any(&path)?;
            symlink(target, &path)?;
            Ok(0)
        }
    }
}
