use std::collections::HashSet;

use ll_schema::ObjectId;
use serde::Serialize;
use tracing::{debug, info};

use super::checkout::read_tree;
use super::object::{CommitObject, ObjectKind, TreeEntry};
use super::objects::ObjectStore;
use super::refs::RefStore;
use crate::error::Result;

/// Outcome of a refs-only prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    /// Objects present locally before pruning.
    pub objects_total: u64,
    /// Objects deleted.
    pub objects_pruned: u64,
    /// Bytes released.
    pub bytes_freed: u64,
}

type Reachable = HashSet<(ObjectId, ObjectKind)>;

/// Delete every local object not reachable from a ref.
///
/// Commit history is followed as far as it is present; a missing parent
/// commit ends the walk for that ref.
pub(crate) fn prune_unreachable(objects: &ObjectStore, refs: &RefStore) -> Result<PruneStats> {
    let mut reachable = Reachable::new();
    for (name, commit) in refs.list()? {
        debug!(store_ref = %name, %commit, "marking");
        mark_commit(objects, commit, &mut reachable)?;
    }

    let mut stats = PruneStats::default();
    for object in objects.list_local()? {
        stats.objects_total += 1;
        if reachable.contains(&(object.id.clone(), object.kind)) {
            continue;
        }
        stats.bytes_freed += objects.remove(&object.id, object.kind)?;
        stats.objects_pruned += 1;
    }

    info!(
        total = stats.objects_total,
        pruned = stats.objects_pruned,
        freed = stats.bytes_freed,
        "prune finished"
    );
    Ok(stats)
}

fn mark_commit(objects: &ObjectStore, tip: ObjectId, reachable: &mut Reachable) -> Result<()> {
    let mut next = Some(tip);
    let mut first = true;

    while let Some(id) = next.take() {
        if !reachable.insert((id.clone(), ObjectKind::Commit)) {
            break;
        }
        let bytes = match objects.read(&id, ObjectKind::Commit) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() && !first => break,
            Err(e) => return Err(e),
        };
        let commit = CommitObject::from_bytes(&bytes)?;
        mark_tree(objects, &commit.root, reachable)?;
        next = commit.parent;
        first = false;
    }
    Ok(())
}

fn mark_tree(objects: &ObjectStore, id: &ObjectId, reachable: &mut Reachable) -> Result<()> {
    if !reachable.insert((id.clone(), ObjectKind::DirTree)) {
        return Ok(());
    }
    for entry in read_tree(objects, id)?.entries {
        match entry {
            TreeEntry::File { id, .. } => {
                reachable.insert((id, ObjectKind::File));
            }
            TreeEntry::Dir { id, .. } => mark_tree(objects, &id, reachable)?,
            TreeEntry::Symlink { .. } => {}
        }
    }
    Ok(())
}
