//! Mirror pulls.
//!
//! A pull makes one local ref equal to the remote's: it walks the remote
//! commit, its trees and their files, downloads what the store lacks into a
//! single transaction, and points the ref at exactly the remote commit. Only
//! the tip commit is fetched.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use ll_schema::{ObjectId, Reference};
use tracing::{debug, info, warn};

use super::progress::PullProgress;
use super::source::{FileSource, ObjectSource, source_for};
use crate::error::{RepoError, Result};
use crate::reporter::{NullReporter, Reporter};
use crate::store::{CommitObject, DirTree, LocalRepo, ObjectKind, Transaction, TreeEntry};

/// Concurrent object downloads per pull.
pub const FETCH_CONCURRENCY: usize = 8;

/// Name under which the isolated staging store knows its remote.
const ISOLATED_REMOTE: &str = "isolated";

/// Pull `reference` from `source` into `repo`.
///
/// Unless `force` is set, a ref that already points at the remote commit is
/// left alone. Returns the commit the ref now points at.
///
/// # Errors
///
/// `NotFound` if the remote has no such ref, `InvalidData` if a downloaded
/// object does not hash to its id, `Transaction` if another transaction is
/// open. On any error the local ref is unchanged.
pub async fn pull_from_source(
    repo: &LocalRepo,
    source: &dyn ObjectSource,
    reference: &Reference,
    force: bool,
    reporter: &dyn Reporter,
) -> Result<ObjectId> {
    let store_ref = reference.to_store_ref();
    let remote_commit = source.read_ref(&store_ref).await?.ok_or_else(|| {
        RepoError::NotFound(format!("{reference} on {}", source.describe()))
    })?;

    if !force && repo.read_ref(&store_ref)?.as_ref() == Some(&remote_commit) {
        info!(%reference, commit = %remote_commit, "already up to date");
        reporter.done(reference, "already up to date");
        return Ok(remote_commit);
    }

    let mut txn = repo.prepare_transaction()?;
    let mut progress = PullProgress::new();

    fetch_missing(
        &mut txn,
        source,
        vec![remote_commit.clone()],
        ObjectKind::Commit,
        &mut progress,
        reference,
        reporter,
    )
    .await?;
    let commit = CommitObject::from_bytes(&txn.read_object(&remote_commit, ObjectKind::Commit)?)?;
    progress.scanned();

    let files = walk_trees(&mut txn, source, commit.root, &mut progress, reference, reporter).await?;
    fetch_missing(
        &mut txn,
        source,
        files,
        ObjectKind::File,
        &mut progress,
        reference,
        reporter,
    )
    .await?;

    txn.set_ref(&store_ref, Some(remote_commit.clone()));
    txn.commit()?;

    reporter.progress(reference, 100, &progress.status_line());
    info!(
        %reference,
        commit = %remote_commit,
        objects = progress.fetched_objects(),
        bytes = progress.bytes(),
        "pulled"
    );
    Ok(remote_commit)
}

/// Breadth-first over the tree graph, downloading missing trees level by
/// level. Returns the file objects the store still lacks.
async fn walk_trees(
    txn: &mut Transaction<'_>,
    source: &dyn ObjectSource,
    root: ObjectId,
    progress: &mut PullProgress,
    reference: &Reference,
    reporter: &dyn Reporter,
) -> Result<Vec<ObjectId>> {
    let mut seen_trees = HashSet::from([root.clone()]);
    let mut wanted_files = HashSet::new();
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        fetch_missing(
            txn,
            source,
            frontier.clone(),
            ObjectKind::DirTree,
            progress,
            reference,
            reporter,
        )
        .await?;

        let mut next = Vec::new();
        for id in frontier {
            let tree = DirTree::from_bytes(&txn.read_object(&id, ObjectKind::DirTree)?)?;
            progress.scanned();
            for entry in tree.entries {
                match entry {
                    TreeEntry::Dir { id, .. } => {
                        if seen_trees.insert(id.clone()) {
                            next.push(id);
                        }
                    }
                    TreeEntry::File { id, .. } => {
                        if !txn.has_object(&id, ObjectKind::File) {
                            wanted_files.insert(id);
                        }
                    }
                    TreeEntry::Symlink { .. } => {}
                }
            }
        }
        frontier = next;
    }

    let mut files: Vec<ObjectId> = wanted_files.into_iter().collect();
    files.sort();
    Ok(files)
}

/// Download every object in `ids` the transaction cannot already see and
/// stage it after checking its hash.
async fn fetch_missing(
    txn: &mut Transaction<'_>,
    source: &dyn ObjectSource,
    ids: Vec<ObjectId>,
    kind: ObjectKind,
    progress: &mut PullProgress,
    reference: &Reference,
    reporter: &dyn Reporter,
) -> Result<()> {
    let missing: Vec<ObjectId> = ids
        .into_iter()
        .filter(|id| !txn.has_object(id, kind))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let metadata = kind.is_metadata();
    progress.requested(missing.len() as u64, metadata);
    debug!(count = missing.len(), kind = kind.extension(), "fetching objects");

    let mut fetches = stream::iter(missing.into_iter().map(|id| async move {
        let bytes = source.fetch(&id, kind).await?;
        Ok::<_, RepoError>((id, bytes))
    }))
    .buffer_unordered(FETCH_CONCURRENCY);

    while let Some(fetched) = fetches.next().await {
        let (id, bytes) = fetched?;
        txn.write_verified(&id, kind, &bytes)?;
        progress.fetched(bytes.len() as u64, metadata);
        reporter.progress(reference, progress.percent(), &progress.status_line());
    }
    Ok(())
}

/// Pull through a throwaway store so the primary store's remotes and ref
/// namespace stay untouched until the transfer is complete.
///
/// The staging store lives under `<root>/cache/isolated-pull-*`, reads
/// objects through the primary store, and is deleted afterwards whatever the
/// outcome. The second hop is a plain local copy without deltas or signature
/// checks.
pub async fn pull_isolated(
    repo: &LocalRepo,
    url: &str,
    reference: &Reference,
    reporter: &dyn Reporter,
) -> Result<ObjectId> {
    let cache = repo.layout().cache_dir();
    std::fs::create_dir_all(&cache)?;
    let staging = tempfile::Builder::new()
        .prefix("isolated-pull-")
        .tempdir_in(&cache)?;
    debug!(staging = %staging.path().display(), "isolated pull staging");

    let result = async {
        let mut child = LocalRepo::create_child(&staging.path().join("repoTmp"), repo)?;
        child.remote_add(ISOLATED_REMOTE, url)?;
        let source = source_for(child.remote(ISOLATED_REMOTE)?)?;
        pull_from_source(&child, source.as_ref(), reference, true, &NullReporter).await?;

        let local = FileSource::open(child.repo_dir())?;
        pull_from_source(repo, &local, reference, false, reporter).await
    }
    .await;

    let path = staging.path().to_path_buf();
    if let Err(e) = staging.close() {
        warn!(path = %path.display(), error = %e, "failed to remove isolated pull staging");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Repo;
    use crate::sync::source::HttpSource;
    use ll_schema::RepoConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    fn reference() -> Reference {
        Reference::parse("org.deepin.demo/1.0.0/x86_64").unwrap()
    }

    fn open_repo() -> (TempDir, LocalRepo) {
        let dir = tempdir().unwrap();
        let repo = LocalRepo::open(dir.path(), RepoConfig::default()).unwrap();
        (dir, repo)
    }

    fn sample_tree(dir: &Path) {
        fs::create_dir_all(dir.join("files/bin")).unwrap();
        fs::create_dir_all(dir.join("files/share/empty")).unwrap();
        fs::write(dir.join("info.json"), r#"{"appid":"org.deepin.demo","version":"1.0.0"}"#)
            .unwrap();
        fs::write(dir.join("files/bin/demo"), "#!/bin/sh\necho demo\n").unwrap();
        fs::write(dir.join("files/share/readme"), "hello").unwrap();
        std::os::unix::fs::symlink("bin/demo", dir.join("files/run")).unwrap();
    }

    /// Upstream store holding `reference()`, exposed as a file source.
    fn upstream() -> (TempDir, LocalRepo) {
        let (dir, repo) = open_repo();
        let src = dir.path().join("src");
        sample_tree(&src);
        repo.import_directory(&reference(), &src).unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn pull_mirrors_remote_commit() {
        let (_up_dir, up) = upstream();
        let (dir, local) = open_repo();
        let source = FileSource::open(up.repo_dir()).unwrap();

        let commit = pull_from_source(&local, &source, &reference(), false, &NullReporter)
            .await
            .unwrap();
        assert_eq!(commit, up.resolve_rev(&reference()).unwrap());
        assert_eq!(local.resolve_rev(&reference()).unwrap(), commit);

        let out = dir.path().join("out");
        local.checkout(&reference(), "", &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("files/share/readme")).unwrap(), "hello");
        assert!(out.join("files/share/empty").is_dir());
        assert_eq!(
            fs::read_link(out.join("files/run")).unwrap(),
            Path::new("bin/demo")
        );
    }

    #[tokio::test]
    async fn second_pull_is_a_no_op() {
        let (_up_dir, up) = upstream();
        let (_dir, local) = open_repo();
        let source = FileSource::open(up.repo_dir()).unwrap();

        pull_from_source(&local, &source, &reference(), false, &NullReporter)
            .await
            .unwrap();
        let before = local.objects().list_local().unwrap().len();
        pull_from_source(&local, &source, &reference(), true, &NullReporter)
            .await
            .unwrap();
        assert_eq!(local.objects().list_local().unwrap().len(), before);
    }

    #[tokio::test]
    async fn missing_remote_ref_is_not_found() {
        let (_up_dir, up) = upstream();
        let (_dir, local) = open_repo();
        let source = FileSource::open(up.repo_dir()).unwrap();
        let other = Reference::parse("org.other/1.0.0/x86_64").unwrap();

        let err = pull_from_source(&local, &source, &other, false, &NullReporter)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(local.list_local_refs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_object_aborts_without_ref_change() {
        let (_up_dir, up) = upstream();
        let victim = up
            .objects()
            .list_local()
            .unwrap()
            .into_iter()
            .find(|o| o.kind == ObjectKind::File)
            .unwrap();
        let path = up.objects().object_path(&victim.id, ObjectKind::File);
        let mut perms = fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o644);
        fs::set_permissions(&path, perms).unwrap();
        fs::write(&path, "tampered").unwrap();

        let (_dir, local) = open_repo();
        let source = FileSource::open(up.repo_dir()).unwrap();
        let err = pull_from_source(&local, &source, &reference(), false, &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
        assert!(local.list_local_refs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tree_escaping_its_directory_is_rejected() {
        let (up_dir, up) = open_repo();
        {
            let mut txn = up.prepare_transaction().unwrap();
            let file = txn.write_bytes(ObjectKind::File, b"outside").unwrap();
            let root = txn
                .write_tree(&DirTree::new(vec![TreeEntry::File {
                    name: "../escaped".into(),
                    mode: 0o644,
                    id: file,
                }]))
                .unwrap();
            let commit = txn
                .write_commit(&CommitObject {
                    root,
                    parent: None,
                    timestamp: 0,
                    subject: "hostile".into(),
                })
                .unwrap();
            txn.set_ref(&reference().to_store_ref(), Some(commit));
            txn.commit().unwrap();
        }

        let (dir, local) = open_repo();
        let source = FileSource::open(up.repo_dir()).unwrap();
        let err = pull_from_source(&local, &source, &reference(), false, &NullReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
        assert!(local.list_local_refs().unwrap().is_empty());

        // the upstream store itself refuses to materialize it
        let out = up_dir.path().join("out/target");
        assert!(up.checkout(&reference(), "", &out).is_err());
        assert!(!up_dir.path().join("out/escaped").exists());
        assert!(!dir.path().join("escaped").exists());
    }

    #[tokio::test]
    async fn isolated_pull_lands_in_primary_and_cleans_up() {
        let (_up_dir, up) = upstream();
        let (dir, local) = open_repo();
        let url = format!("file://{}", up.repo_dir().display());

        pull_isolated(&local, &url, &reference(), &NullReporter)
            .await
            .unwrap();
        assert_eq!(
            local.resolve_rev(&reference()).unwrap(),
            up.resolve_rev(&reference()).unwrap()
        );
        assert!(!local.remote_list().contains(&ISOLATED_REMOTE.to_string()));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("isolated-pull-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn isolated_pull_failure_still_cleans_up() {
        let (dir, local) = open_repo();
        let missing = dir.path().join("nowhere");
        let url = format!("file://{}", missing.display());

        assert!(
            pull_isolated(&local, &url, &reference(), &NullReporter)
                .await
                .is_err()
        );
        assert_eq!(fs::read_dir(dir.path().join("cache")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn pull_over_http() {
        let (_up_dir, up) = upstream();
        let mut server = mockito::Server::new_async().await;
        let store_ref = reference().to_store_ref();
        let commit = up.read_ref(&store_ref).unwrap().unwrap();

        let mut mocks = vec![
            server
                .mock("GET", format!("/repos/stable/refs/heads/{store_ref}").as_str())
                .with_body(commit.to_string())
                .create_async()
                .await,
        ];
        for object in up.objects().list_local().unwrap() {
            let body = up.objects().read(&object.id, object.kind).unwrap();
            let path = format!(
                "/repos/stable/objects/{}/{}.{}",
                object.id.prefix(),
                object.id,
                object.kind.extension()
            );
            mocks.push(
                server
                    .mock("GET", path.as_str())
                    .with_body(body)
                    .create_async()
                    .await,
            );
        }

        let (_dir, local) = open_repo();
        let source = HttpSource::new(&format!("{}/repos/stable", server.url()), false).unwrap();
        pull_from_source(&local, &source, &reference(), false, &NullReporter)
            .await
            .unwrap();
        assert_eq!(local.resolve_rev(&reference()).unwrap(), commit);
    }
}
