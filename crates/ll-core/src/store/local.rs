//! On-disk content store.
//!
//! Layout under `<root>/repo`:
//! - `config.toml`: core options and remotes
//! - `objects/`: content-addressed objects
//! - `refs/heads/`: one file per stored reference
//! - `tmp/`: transaction staging

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use ll_schema::{ObjectId, Reference, RepoConfig};
use tracing::{debug, info, warn};

use super::checkout::{checkout_tree, write_directory};
use super::object::{CommitObject, ObjectKind};
use super::objects::ObjectStore;
use super::prune::{PruneStats, prune_unreachable};
use super::refs::RefStore;
use super::transaction::{Transaction, replay_ref_journal};
use super::{CommitSource, Repo};
use crate::config::{RemoteSection, StoreConfig, save_config, store_url};
use crate::error::{RepoError, Result};
use crate::paths::Layout;

/// The production [`Repo`].
#[derive(Debug)]
pub struct LocalRepo {
    layout: Layout,
    repo_dir: PathBuf,
    objects: ObjectStore,
    refs: RefStore,
    config: RepoConfig,
    store_config: StoreConfig,
    txn_lock: AtomicBool,
}

impl LocalRepo {
    /// Open (creating if needed) the store under data root `root`.
    ///
    /// Writes `config` to `<root>/config.yaml` when that file does not exist
    /// yet, and makes sure the store has a remote entry for the default repo.
    pub fn open(root: &Path, config: RepoConfig) -> Result<Self> {
        config.validate()?;
        let layout = Layout::new(root);

        let config_file = layout.config_file();
        if !config_file.exists() {
            save_config(&config_file, &config)?;
        }

        let repo_dir = layout.repo_dir();
        let mut store_config = init_store_dir(&repo_dir, None)?;
        if let Some(url) = config.default_url() {
            let name = &config.default_repo;
            if !store_config.remote.contains_key(name) {
                store_config
                    .remote
                    .insert(name.clone(), RemoteSection::new(store_url(url, name)));
                store_config.save(&repo_dir)?;
            }
        }

        debug!(repo = %repo_dir.display(), "opened store");
        Self::assemble(layout, repo_dir, config, store_config)
    }

    /// Create a store at `repo_dir` whose object reads fall back to `parent`.
    ///
    /// Refs are private to the new store. Used for staging pulls.
    pub fn create_child(repo_dir: &Path, parent: &LocalRepo) -> Result<Self> {
        let store_config = init_store_dir(repo_dir, Some(parent.repo_dir.clone()))?;
        let layout = Layout::new(repo_dir);
        Self::assemble(
            layout,
            repo_dir.to_path_buf(),
            parent.config.clone(),
            store_config,
        )
    }

    fn assemble(
        layout: Layout,
        repo_dir: PathBuf,
        config: RepoConfig,
        store_config: StoreConfig,
    ) -> Result<Self> {
        let objects = ObjectStore::for_repo(&repo_dir)?;
        let refs = RefStore::new(&repo_dir);
        replay_ref_journal(&refs, &repo_dir.join("tmp"))?;
        Ok(Self {
            layout,
            refs,
            repo_dir,
            objects,
            config,
            store_config,
            txn_lock: AtomicBool::new(false),
        })
    }

    /// Data-root layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The store directory (`<root>/repo`).
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Object directory, including the parent chain.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Begin a transaction. Only one may be open at a time.
    pub fn prepare_transaction(&self) -> Result<Transaction<'_>> {
        Transaction::begin(
            &self.objects,
            &self.refs,
            &self.txn_lock,
            &self.repo_dir.join("tmp"),
        )
    }

    /// Commit a stored ref points at, if any.
    pub fn read_ref(&self, store_ref: &str) -> Result<Option<ObjectId>> {
        self.refs.read(store_ref)
    }

    /// Load a commit object.
    pub fn read_commit(&self, id: &ObjectId) -> Result<CommitObject> {
        CommitObject::from_bytes(&self.objects.read(id, ObjectKind::Commit)?)
    }

    /// Name of the remote used by default.
    pub fn default_remote(&self) -> &str {
        &self.config.default_repo
    }

    /// Definition of remote `name`.
    pub fn remote(&self, name: &str) -> Result<&RemoteSection> {
        self.store_config
            .remote
            .get(name)
            .ok_or_else(|| RepoError::NotFound(format!("remote '{name}'")))
    }

    /// Names of all configured remotes.
    pub fn remote_list(&self) -> Vec<String> {
        self.store_config.remote.keys().cloned().collect()
    }

    /// URL of remote `name`.
    pub fn remote_show_url(&self, name: &str) -> Result<String> {
        self.remote(name).map(|r| r.url.clone())
    }

    /// Add remote `name`, replacing any existing definition.
    pub fn remote_add(&mut self, name: &str, url: &str) -> Result<()> {
        let previous = self
            .store_config
            .remote
            .insert(name.to_string(), RemoteSection::new(url));
        self.store_config.save(&self.repo_dir)?;
        if previous.is_some() {
            info!(remote = name, url, "replaced remote");
        } else {
            info!(remote = name, url, "added remote");
        }
        Ok(())
    }

    /// Remove `reference` from the ref namespace. Objects stay until pruned.
    pub fn delete_ref(&self, reference: &Reference) -> Result<()> {
        let store_ref = reference.to_store_ref();
        if self.refs.read(&store_ref)?.is_none() {
            return Err(RepoError::NotFound(reference.to_string()));
        }
        let mut txn = self.prepare_transaction()?;
        txn.set_ref(&store_ref, None);
        txn.commit()
    }

    /// Delete objects no ref reaches. Holds the transaction lock throughout.
    pub fn prune(&self) -> Result<PruneStats> {
        let _guard = self.prepare_transaction()?;
        prune_unreachable(&self.objects, &self.refs)
    }
}

fn init_store_dir(repo_dir: &Path, parent: Option<PathBuf>) -> Result<StoreConfig> {
    fs::create_dir_all(repo_dir.join("objects"))?;
    fs::create_dir_all(repo_dir.join("refs").join("heads"))?;
    fs::create_dir_all(repo_dir.join("tmp"))?;

    if repo_dir.join("config.toml").exists() {
        let mut config = StoreConfig::load(repo_dir)?;
        if parent.is_some() && config.core.parent != parent {
            config.core.parent = parent;
            config.save(repo_dir)?;
        }
        return Ok(config);
    }

    let mut config = StoreConfig::default();
    config.core.parent = parent;
    config.save(repo_dir)?;
    Ok(config)
}

impl Repo for LocalRepo {
    fn commit(&self, source: CommitSource<'_>, reference: &Reference) -> Result<()> {
        let store_ref = reference.to_store_ref();
        let mut txn = self.prepare_transaction()?;

        let (root, subject) = match source {
            CommitSource::Directory(path) => {
                if !path.is_dir() {
                    return Err(RepoError::NotFound(format!(
                        "directory {}",
                        path.display()
                    )));
                }
                let root = write_directory(&mut txn, path)?;
                (root, format!("import {}", path.display()))
            }
            CommitSource::Ref(old) => {
                let commit = self.read_commit(&self.resolve_rev(old)?)?;
                (commit.root, format!("import {old}"))
            }
        };

        let commit = CommitObject {
            root,
            parent: self.refs.read(&store_ref)?,
            timestamp: chrono::Utc::now().timestamp(),
            subject,
        };
        let id = txn.write_commit(&commit)?;
        txn.set_ref(&store_ref, Some(id.clone()));
        txn.commit()?;

        info!(%reference, commit = %id, "committed");
        Ok(())
    }

    fn checkout(&self, reference: &Reference, sub_path: &str, target: &Path) -> Result<()> {
        let id = self.resolve_rev(reference)?;
        let commit = self.read_commit(&id)?;
        let files = checkout_tree(&self.objects, &commit.root, sub_path, target)?;
        debug!(%reference, target = %target.display(), files, "checked out");
        Ok(())
    }

    fn list_local_refs(&self) -> Result<Vec<Reference>> {
        let mut out = Vec::new();
        for (name, _) in self.refs.list()? {
            match Reference::from_store_ref(&name) {
                Ok(reference) => out.push(reference),
                Err(e) => warn!(store_ref = %name, error = %e, "ignoring foreign ref"),
            }
        }
        Ok(out)
    }

    fn resolve_rev(&self, reference: &Reference) -> Result<ObjectId> {
        self.refs
            .read(&reference.to_store_ref())?
            .ok_or_else(|| RepoError::NotFound(reference.to_string()))
    }

    fn config(&self) -> &RepoConfig {
        &self.config
    }

    fn set_config(&mut self, config: RepoConfig) -> Result<()> {
        if config == self.config {
            return Ok(());
        }
        config.validate()?;
        save_config(&self.layout.config_file(), &config)?;

        if let Some(url) = config.default_url() {
            let name = config.default_repo.clone();
            self.store_config
                .remote
                .insert(name.clone(), RemoteSection::new(store_url(url, &name)));
            self.store_config.save(&self.repo_dir)?;
        }

        self.config = config;
        Ok(())
    }

    fn root_of_layer(&self, reference: &Reference) -> PathBuf {
        self.layout.layer_dir(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{TempDir, tempdir};

    fn reference(s: &str) -> Reference {
        Reference::parse(s).unwrap()
    }

    fn sample_tree(dir: &Path) {
        fs::create_dir_all(dir.join("files/bin")).unwrap();
        fs::write(dir.join("info.json"), r#"{"appid":"app","version":"1.0.0"}"#).unwrap();
        fs::write(dir.join("files/bin/app"), "#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(dir.join("files/bin/app"), fs::Permissions::from_mode(0o700))
            .unwrap();
        std::os::unix::fs::symlink("bin/app", dir.join("files/run")).unwrap();
    }

    fn open() -> (TempDir, LocalRepo) {
        let dir = tempdir().unwrap();
        let repo = LocalRepo::open(&dir.path().join("root"), RepoConfig::default()).unwrap();
        (dir, repo)
    }

    #[test]
    fn open_writes_default_config() {
        let (dir, repo) = open();
        let root = dir.path().join("root");
        assert!(root.join("config.yaml").exists());
        assert!(root.join("repo/config.toml").exists());
        assert_eq!(repo.remote_list(), vec!["stable".to_string()]);
        assert_eq!(
            repo.remote_show_url("stable").unwrap(),
            "https://mirror-repo-linglong.deepin.com/repos/stable"
        );
        assert!(!repo.remote("stable").unwrap().gpg_verify);
    }

    #[test]
    fn commit_then_checkout_reproduces_tree() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let r = reference("org.deepin.demo/1.0.0/x86_64");

        repo.import_directory(&r, &src).unwrap();
        assert_eq!(repo.list_local_refs().unwrap(), vec![r.clone()]);

        let out = dir.path().join("out");
        repo.checkout(&r, "", &out).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("files/bin/app")).unwrap(),
            "#!/bin/sh\necho hi\n"
        );
        assert_eq!(
            fs::read(out.join("info.json")).unwrap(),
            fs::read(src.join("info.json")).unwrap()
        );
        assert_eq!(
            fs::read_link(out.join("files/run")).unwrap(),
            Path::new("bin/app")
        );
        let mode = fs::metadata(out.join("files/bin/app"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn checkout_sub_path_and_merge() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let r = reference("app/1.0.0/x86_64");
        repo.import_directory(&r, &src).unwrap();

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("bin"), "stale").unwrap();
        fs::write(out.join("other"), "kept").unwrap();

        repo.checkout(&r, "/files", &out).unwrap();
        repo.checkout(&r, "files", &out).unwrap();
        assert!(out.join("bin/app").is_file());
        assert_eq!(fs::read_to_string(out.join("other")).unwrap(), "kept");
        assert!(!out.join("info.json").exists());

        let err = repo.checkout(&r, "nope", &out).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn checkout_unknown_ref_is_not_found() {
        let (dir, repo) = open();
        let err = repo
            .checkout(&reference("app/9.9.9/x86_64"), "", &dir.path().join("out"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn failed_commit_leaves_refs_unchanged() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let good = reference("app/1.0.0/x86_64");
        repo.import_directory(&good, &src).unwrap();
        let before = repo.list_local_refs().unwrap();

        // source ref does not exist
        let err = repo
            .import_ref(&reference("app/2.0.0/x86_64"), &reference("app/3.0.0/x86_64"))
            .unwrap_err();
        assert!(err.is_not_found());
        // source directory does not exist
        assert!(
            repo.import_directory(&reference("app/4.0.0/x86_64"), &dir.path().join("missing"))
                .is_err()
        );

        assert_eq!(repo.list_local_refs().unwrap(), before);
        assert_eq!(fs::read_dir(repo.repo_dir().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn import_failing_midway_rolls_back() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let good = reference("app/1.0.0/x86_64");
        repo.import_directory(&good, &src).unwrap();
        let refs_before = repo.list_local_refs().unwrap();
        let objects_before = repo.objects().list_local().unwrap().len();

        let bad = dir.path().join("bad");
        fs::create_dir_all(bad.join("a/deep/dir")).unwrap();
        fs::write(bad.join("a/one"), "new content one").unwrap();
        fs::write(bad.join("a/deep/two"), "new content two").unwrap();
        fs::write(bad.join("a/deep/dir").join(OsStr::from_bytes(b"bad\xff")), "x").unwrap();

        let err = repo
            .import_directory(&reference("app/2.0.0/x86_64"), &bad)
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));

        assert_eq!(repo.list_local_refs().unwrap(), refs_before);
        assert_eq!(repo.objects().list_local().unwrap().len(), objects_before);
        assert_eq!(fs::read_dir(repo.repo_dir().join("tmp")).unwrap().count(), 0);

        // the transaction lock was released
        drop(repo.prepare_transaction().unwrap());
        repo.import_directory(&reference("app/3.0.0/x86_64"), &src)
            .unwrap();
        assert_eq!(repo.list_local_refs().unwrap().len(), 2);
    }

    #[test]
    fn read_only_directories_can_be_overlaid() {
        let (dir, repo) = open();
        let runtime_src = dir.path().join("runtime");
        let devel_src = dir.path().join("devel");
        fs::create_dir_all(runtime_src.join("share")).unwrap();
        fs::create_dir_all(devel_src.join("share")).unwrap();
        fs::write(runtime_src.join("share/data"), "data").unwrap();
        fs::write(devel_src.join("share/app.h"), "hdr").unwrap();
        for d in [&runtime_src, &devel_src] {
            fs::set_permissions(d.join("share"), fs::Permissions::from_mode(0o555)).unwrap();
        }

        let runtime = reference("app/1.0.0/x86_64");
        repo.import_directory(&runtime, &runtime_src).unwrap();
        repo.import_directory(&runtime.with_module(ll_schema::Module::devel()), &devel_src)
            .unwrap();

        let out = dir.path().join("out");
        repo.checkout(&runtime, "", &out).unwrap();
        repo.checkout(&runtime, "", &out).unwrap();
        repo.checkout_all(&runtime, "", &out).unwrap();

        assert_eq!(fs::read_to_string(out.join("share/data")).unwrap(), "data");
        assert_eq!(fs::read_to_string(out.join("share/app.h")).unwrap(), "hdr");
        let mode = fs::metadata(out.join("share")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);

        for d in [runtime_src.join("share"), devel_src.join("share"), out.join("share")] {
            fs::set_permissions(d, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn corrupt_devel_module_is_reported() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let runtime = reference("app/1.0.0/x86_64");
        let devel = runtime.with_module(ll_schema::Module::devel());
        let devel_src = dir.path().join("devel");
        fs::create_dir_all(devel_src.join("include")).unwrap();
        fs::write(devel_src.join("include/app.h"), "hdr").unwrap();
        repo.import_directory(&runtime, &src).unwrap();
        repo.import_directory(&devel, &devel_src).unwrap();

        let commit = repo.read_commit(&repo.resolve_rev(&devel).unwrap()).unwrap();
        let tree = repo.objects().object_path(&commit.root, ObjectKind::DirTree);
        fs::set_permissions(&tree, fs::Permissions::from_mode(0o644)).unwrap();
        fs::write(&tree, "garbage").unwrap();

        let out = dir.path().join("out");
        let err = repo.checkout_all(&runtime, "", &out).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
        assert!(out.join("files/bin/app").exists());
    }

    #[test]
    fn import_ref_retags_the_same_tree() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let old = reference("app/1.0.0/x86_64");
        let new = reference("linglong:app/1.0.0/x86_64");
        repo.import_directory(&old, &src).unwrap();
        repo.import_ref(&old, &new).unwrap();

        let a = repo.read_commit(&repo.resolve_rev(&old).unwrap()).unwrap();
        let b = repo.read_commit(&repo.resolve_rev(&new).unwrap()).unwrap();
        assert_eq!(a.root, b.root);
    }

    #[test]
    fn recommit_records_parent() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let r = reference("app/1.0.0/x86_64");
        repo.import_directory(&r, &src).unwrap();
        let first = repo.resolve_rev(&r).unwrap();

        fs::write(src.join("new-file"), "more").unwrap();
        repo.import_directory(&r, &src).unwrap();
        let second = repo.read_commit(&repo.resolve_rev(&r).unwrap()).unwrap();
        assert_eq!(second.parent, Some(first));
    }

    #[test]
    fn delete_ref_and_prune() {
        let (dir, repo) = open();
        let keep_src = dir.path().join("keep");
        let drop_src = dir.path().join("drop");
        fs::create_dir_all(&keep_src).unwrap();
        fs::create_dir_all(&drop_src).unwrap();
        fs::write(keep_src.join("shared"), "shared").unwrap();
        fs::write(drop_src.join("shared"), "shared").unwrap();
        fs::write(drop_src.join("only"), "only in dropped tree").unwrap();

        let keep = reference("keep/1.0.0/x86_64");
        let gone = reference("gone/1.0.0/x86_64");
        repo.import_directory(&keep, &keep_src).unwrap();
        repo.import_directory(&gone, &drop_src).unwrap();

        repo.delete_ref(&gone).unwrap();
        assert!(repo.delete_ref(&gone).unwrap_err().is_not_found());

        let stats = repo.prune().unwrap();
        // dropped tree, its commit and the unshared file
        assert_eq!(stats.objects_pruned, 3);
        assert_eq!(stats.objects_total, 6);
        assert!(stats.bytes_freed > 0);

        let out = dir.path().join("out");
        repo.checkout(&keep, "", &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("shared")).unwrap(), "shared");
    }

    #[test]
    fn set_config_persists_and_rewrites_remote() {
        let (dir, mut repo) = open();
        let mut config = RepoConfig::default();
        config
            .repos
            .insert("nightly".into(), "https://nightly.example".into());
        config.default_repo = "nightly".into();

        repo.set_config(config.clone()).unwrap();
        assert_eq!(repo.config(), &config);
        assert_eq!(
            repo.remote_show_url("nightly").unwrap(),
            "https://nightly.example/repos/nightly"
        );
        let on_disk = crate::config::load_config(&dir.path().join("root/config.yaml")).unwrap();
        assert_eq!(on_disk, config);

        let mut bad = config;
        bad.version = 3;
        assert!(repo.set_config(bad).is_err());
    }

    #[test]
    fn child_store_reads_parent_objects() {
        let (dir, repo) = open();
        let src = dir.path().join("src");
        sample_tree(&src);
        let r = reference("app/1.0.0/x86_64");
        repo.import_directory(&r, &src).unwrap();
        let commit = repo.resolve_rev(&r).unwrap();

        let child = LocalRepo::create_child(&dir.path().join("child"), &repo).unwrap();
        assert!(child.objects().contains(&commit, ObjectKind::Commit));
        assert!(child.list_local_refs().unwrap().is_empty());
    }

    #[test]
    fn root_of_layer_path() {
        let (dir, repo) = open();
        assert_eq!(
            repo.root_of_layer(&reference("app/1.0.0/arm64")),
            dir.path().join("root/layers/main/app/1.0.0/arm64")
        );
    }
}
