//! Store transactions.
//!
//! Objects written inside a transaction are staged in a private directory
//! under `<repo>/tmp`. [`Transaction::commit`] moves them into the object
//! directory and only then applies ref updates, so a ref never points at a
//! partially written tree. Dropping a transaction without committing discards
//! the staging directory and leaves every ref untouched.
//!
//! Ref updates are written to a journal in `<repo>/tmp` before the ref files
//! are replaced one by one. If the process dies in between, the next
//! [`LocalRepo::open`](super::LocalRepo::open) replays the journal, so either
//! all refs of a commit change or none do.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use blake3::Hasher;
use ll_schema::ObjectId;
use tempfile::TempDir;
use tracing::{debug, trace, warn};

use super::object::{CommitObject, DirTree, ObjectKind};
use super::objects::ObjectStore;
use super::refs::RefStore;
use crate::error::{RepoError, Result};
use crate::fsutil::write_atomic;

/// Pending ref updates of a commit, inside `<repo>/tmp`.
const REF_JOURNAL: &str = "refs.journal";

/// An open transaction against one store.
#[derive(Debug)]
pub struct Transaction<'a> {
    objects: &'a ObjectStore,
    refs: &'a RefStore,
    lock: &'a AtomicBool,
    tmp_dir: PathBuf,
    staging: TempDir,
    staged: HashSet<(ObjectId, ObjectKind)>,
    ref_updates: BTreeMap<String, Option<ObjectId>>,
}

impl<'a> Transaction<'a> {
    /// Start a transaction. Fails if `lock` shows another one is open.
    pub(crate) fn begin(
        objects: &'a ObjectStore,
        refs: &'a RefStore,
        lock: &'a AtomicBool,
        tmp_dir: &Path,
    ) -> Result<Self> {
        if lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RepoError::transaction(
                "another transaction is already in progress",
            ));
        }

        let staging = match prepare_staging(tmp_dir) {
            Ok(dir) => dir,
            Err(e) => {
                lock.store(false, Ordering::Release);
                return Err(e);
            }
        };
        debug!(staging = %staging.path().display(), "transaction prepared");

        Ok(Self {
            objects,
            refs,
            lock,
            tmp_dir: tmp_dir.to_path_buf(),
            staging,
            staged: HashSet::new(),
            ref_updates: BTreeMap::new(),
        })
    }

    fn staged_path(&self, id: &ObjectId, kind: ObjectKind) -> PathBuf {
        self.staging
            .path()
            .join(format!("{id}.{}", kind.extension()))
    }

    /// Whether an object is already staged or stored.
    pub fn has_object(&self, id: &ObjectId, kind: ObjectKind) -> bool {
        self.staged.contains(&(id.clone(), kind)) || self.objects.contains(id, kind)
    }

    /// Read an object from the staging area or the store.
    pub fn read_object(&self, id: &ObjectId, kind: ObjectKind) -> Result<Vec<u8>> {
        if self.staged.contains(&(id.clone(), kind)) {
            return Ok(fs::read(self.staged_path(id, kind))?);
        }
        self.objects.read(id, kind)
    }

    /// Stage an object from memory. Returns its id.
    pub fn write_bytes(&mut self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::compute(data);
        if !self.has_object(&id, kind) {
            fs::write(self.staged_path(&id, kind), data)?;
            self.staged.insert((id.clone(), kind));
            trace!(%id, kind = kind.extension(), "staged object");
        }
        Ok(id)
    }

    /// Stage an object received from elsewhere, checking it hashes to `id`.
    pub fn write_verified(&mut self, id: &ObjectId, kind: ObjectKind, data: &[u8]) -> Result<()> {
        let actual = ObjectId::compute(data);
        if &actual != id {
            return Err(RepoError::InvalidData(format!(
                "object {id} has content hash {actual}"
            )));
        }
        self.write_bytes(kind, data).map(|_| ())
    }

    /// Stage the content of a regular file, streaming it through the hasher.
    pub fn write_file(&mut self, path: &Path) -> Result<ObjectId> {
        let mut src = File::open(path)?;
        let mut tmp = tempfile::NamedTempFile::new_in(self.staging.path())?;
        let mut hasher = Hasher::new();
        let mut buffer = [0u8; 65536]; // 64KB chunks

        loop {
            let n = src.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            tmp.write_all(&buffer[..n])?;
        }

        let id = ObjectId::from_hasher(&hasher);
        if !self.has_object(&id, ObjectKind::File) {
            tmp.persist(self.staged_path(&id, ObjectKind::File))
                .map_err(|e| e.error)?;
            self.staged.insert((id.clone(), ObjectKind::File));
        }
        Ok(id)
    }

    /// Stage a directory tree.
    pub fn write_tree(&mut self, tree: &DirTree) -> Result<ObjectId> {
        self.write_bytes(ObjectKind::DirTree, &tree.to_bytes()?)
    }

    /// Stage a commit.
    pub fn write_commit(&mut self, commit: &CommitObject) -> Result<ObjectId> {
        self.write_bytes(ObjectKind::Commit, &commit.to_bytes()?)
    }

    /// Queue a ref update; `None` deletes the ref.
    pub fn set_ref(&mut self, store_ref: &str, target: Option<ObjectId>) {
        self.ref_updates.insert(store_ref.to_string(), target);
    }

    /// Number of objects staged so far.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Publish staged objects, then apply ref updates.
    ///
    /// # Errors
    ///
    /// `Transaction` if a ref would point at a commit that is neither staged
    /// nor stored; nothing is published in that case.
    pub fn commit(self) -> Result<()> {
        for (name, target) in &self.ref_updates {
            if let Some(id) = target {
                if !self.has_object(id, ObjectKind::Commit) {
                    return Err(RepoError::transaction(format!(
                        "ref {name} would point at missing commit {id}"
                    )));
                }
            }
        }

        for (id, kind) in &self.staged {
            self.objects
                .insert_staged(&self.staged_path(id, *kind), id, *kind)
                .map_err(|e| RepoError::transaction(format!("publishing {id}: {e}")))?;
        }

        if !self.ref_updates.is_empty() {
            let journal = self.tmp_dir.join(REF_JOURNAL);
            write_atomic(&journal, &serde_json::to_vec(&self.ref_updates)?)?;
            apply_ref_updates(self.refs, &self.ref_updates)?;
            fs::remove_file(&journal)?;
        }

        debug!(
            objects = self.staged.len(),
            refs = self.ref_updates.len(),
            "transaction committed"
        );
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // staging directory is removed by TempDir
        self.lock.store(false, Ordering::Release);
    }
}

fn apply_ref_updates(refs: &RefStore, updates: &BTreeMap<String, Option<ObjectId>>) -> Result<()> {
    for (name, target) in updates {
        match target {
            Some(id) => refs.write(name, id)?,
            None => refs.delete(name)?,
        }
    }
    Ok(())
}

/// Finish the ref updates of a commit interrupted after its objects were
/// published. Returns how many refs were rewritten.
pub(crate) fn replay_ref_journal(refs: &RefStore, tmp_dir: &Path) -> Result<usize> {
    let path = tmp_dir.join(REF_JOURNAL);
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let updates: BTreeMap<String, Option<ObjectId>> = serde_json::from_slice(&bytes)
        .map_err(|e| RepoError::InvalidData(format!("ref journal {}: {e}", path.display())))?;
    apply_ref_updates(refs, &updates)?;
    fs::remove_file(&path)?;
    warn!(refs = updates.len(), "replayed interrupted ref update");
    Ok(updates.len())
}

fn prepare_staging(tmp_dir: &Path) -> Result<TempDir> {
    fs::create_dir_all(tmp_dir)?;
    Ok(tempfile::Builder::new()
        .prefix("txn-")
        .tempdir_in(tmp_dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::TreeEntry;
    use tempfile::tempdir;

    struct Fixture {
        _dir: TempDir,
        objects: ObjectStore,
        refs: RefStore,
        lock: AtomicBool,
        tmp: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        Fixture {
            objects: ObjectStore::with_root(dir.path().join("objects")).unwrap(),
            refs: RefStore::new(dir.path()),
            lock: AtomicBool::new(false),
            tmp: dir.path().join("tmp"),
            _dir: dir,
        }
    }

    fn commit_for(txn: &mut Transaction<'_>, content: &[u8]) -> ObjectId {
        let file = txn.write_bytes(ObjectKind::File, content).unwrap();
        let tree = txn
            .write_tree(&DirTree::new(vec![TreeEntry::File {
                name: "f".into(),
                mode: 0o644,
                id: file,
            }]))
            .unwrap();
        txn.write_commit(&CommitObject {
            root: tree,
            parent: None,
            timestamp: 0,
            subject: "test".into(),
        })
        .unwrap()
    }

    #[test]
    fn commit_publishes_objects_and_refs() {
        let f = fixture();
        let mut txn = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
        let commit = commit_for(&mut txn, b"data");
        txn.set_ref("main/app/1.0.0/x86_64/runtime", Some(commit.clone()));
        txn.commit().unwrap();

        assert!(f.objects.contains(&commit, ObjectKind::Commit));
        assert_eq!(
            f.refs.read("main/app/1.0.0/x86_64/runtime").unwrap(),
            Some(commit)
        );
        assert!(!f.lock.load(Ordering::Acquire));
    }

    #[test]
    fn dropped_transaction_changes_nothing() {
        let f = fixture();
        {
            let mut txn = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
            let commit = commit_for(&mut txn, b"data");
            txn.set_ref("main/app/1.0.0/x86_64/runtime", Some(commit));
        }
        assert!(f.refs.list().unwrap().is_empty());
        assert!(f.objects.list_local().unwrap().is_empty());
        assert_eq!(fs::read_dir(&f.tmp).unwrap().count(), 0);
        assert!(!f.lock.load(Ordering::Acquire));
    }

    #[test]
    fn only_one_open_transaction() {
        let f = fixture();
        let first = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
        let err = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap_err();
        assert!(matches!(err, RepoError::Transaction { .. }));
        drop(first);
        assert!(Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).is_ok());
    }

    #[test]
    fn ref_to_missing_commit_is_rejected() {
        let f = fixture();
        let mut txn = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
        txn.write_bytes(ObjectKind::File, b"orphan").unwrap();
        txn.set_ref("main/app/1.0.0/x86_64/runtime", Some(ObjectId::compute(b"x")));
        assert!(matches!(txn.commit(), Err(RepoError::Transaction { .. })));
        assert!(f.refs.list().unwrap().is_empty());
        assert!(f.objects.list_local().unwrap().is_empty());
    }

    #[test]
    fn interrupted_ref_update_is_replayed() {
        let f = fixture();
        let mut txn = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
        let commit = commit_for(&mut txn, b"data");
        txn.set_ref("main/old/1.0.0/x86_64/runtime", Some(commit.clone()));
        txn.commit().unwrap();
        assert!(!f.tmp.join(REF_JOURNAL).exists());

        // as left by a commit that died after writing its journal
        let mut updates = BTreeMap::new();
        updates.insert("main/old/1.0.0/x86_64/runtime".to_string(), None);
        updates.insert("main/new/1.0.0/x86_64/runtime".to_string(), Some(commit.clone()));
        fs::write(f.tmp.join(REF_JOURNAL), serde_json::to_vec(&updates).unwrap()).unwrap();

        assert_eq!(replay_ref_journal(&f.refs, &f.tmp).unwrap(), 2);
        assert_eq!(f.refs.read("main/old/1.0.0/x86_64/runtime").unwrap(), None);
        assert_eq!(
            f.refs.read("main/new/1.0.0/x86_64/runtime").unwrap(),
            Some(commit)
        );
        assert!(!f.tmp.join(REF_JOURNAL).exists());
        assert_eq!(replay_ref_journal(&f.refs, &f.tmp).unwrap(), 0);
    }

    #[test]
    fn verified_write_checks_hash() {
        let f = fixture();
        let mut txn = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
        let wrong = ObjectId::compute(b"other");
        assert!(matches!(
            txn.write_verified(&wrong, ObjectKind::File, b"data"),
            Err(RepoError::InvalidData(_))
        ));
        let right = ObjectId::compute(b"data");
        txn.write_verified(&right, ObjectKind::File, b"data").unwrap();
        assert!(txn.has_object(&right, ObjectKind::File));
        assert_eq!(txn.read_object(&right, ObjectKind::File).unwrap(), b"data");
    }

    #[test]
    fn streamed_file_matches_in_memory_hash() {
        let f = fixture();
        let src = f.tmp.parent().unwrap().join("big");
        let data = vec![7u8; 200_000];
        fs::write(&src, &data).unwrap();

        let mut txn = Transaction::begin(&f.objects, &f.refs, &f.lock, &f.tmp).unwrap();
        let id = txn.write_file(&src).unwrap();
        assert_eq!(id, ObjectId::compute(&data));
        assert_eq!(txn.staged_count(), 1);
    }
}
