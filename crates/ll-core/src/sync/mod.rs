//! Sync engine.
//!
//! [`SyncEngine`] owns the local store and the remote API client and exposes
//! pull, push, isolated pull and ref deletion as single awaitable calls.
//! In-flight pulls and pushes are tracked by a [`JobTracker`] so the same ref
//! is never transferred twice at once.

use std::sync::Arc;
use std::time::Duration;

use ll_schema::{Module, ObjectId, Reference, RepoConfig};
use tracing::{info, warn};

use crate::error::Result;
use crate::jobs::JobTracker;
use crate::remote::RemoteApi;
use crate::reporter::{NullReporter, Reporter};
use crate::store::{LocalRepo, PruneStats, Repo};

pub mod progress;
pub mod pull;
pub mod push;
pub mod source;

pub use progress::{PullProgress, format_size};
pub use pull::{pull_from_source, pull_isolated};
pub use push::{Credentials, push_with};
pub use source::{FileSource, HttpSource, ObjectSource, source_for};

/// Default delay between upload status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pull/push front-end over one store and one remote.
pub struct SyncEngine {
    repo: LocalRepo,
    remote: Box<dyn RemoteApi>,
    reporter: Arc<dyn Reporter>,
    jobs: JobTracker,
    poll_interval: Duration,
    credentials: Option<Credentials>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("repo", &self.repo)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Engine over `repo` talking to `remote`, reporting nowhere.
    pub fn new(repo: LocalRepo, remote: Box<dyn RemoteApi>) -> Self {
        Self {
            repo,
            remote,
            reporter: Arc::new(NullReporter),
            jobs: JobTracker::spawn(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            credentials: None,
        }
    }

    /// Send progress to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Change the upload status poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Use these credentials instead of the environment.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The underlying store.
    pub fn repo(&self) -> &LocalRepo {
        &self.repo
    }

    /// Mutable access to the store, e.g. for remote edits.
    pub fn repo_mut(&mut self) -> &mut LocalRepo {
        &mut self.repo
    }

    /// The remote API client.
    pub fn remote(&self) -> &dyn RemoteApi {
        self.remote.as_ref()
    }

    /// Job table shared by this engine's operations.
    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Replace the configuration and repoint the remote client.
    ///
    /// Does nothing when `config` equals the current one.
    pub fn set_config(&mut self, config: RepoConfig) -> Result<()> {
        if &config == self.repo.config() {
            return Ok(());
        }
        let endpoint = config.default_url().map(str::to_string);
        self.repo.set_config(config)?;
        if let Some(endpoint) = endpoint {
            self.remote.set_endpoint(&endpoint);
        }
        Ok(())
    }

    /// Mirror `reference` from the default remote.
    pub async fn pull(&self, reference: &Reference, force: bool) -> Result<ObjectId> {
        let store_ref = reference.to_store_ref();
        self.jobs.register(&store_ref).await?;
        self.reporter.section("Pulling");

        let result = async {
            let remote = self.repo.remote(self.repo.default_remote())?;
            let source = source_for(remote)?;
            pull_from_source(
                &self.repo,
                source.as_ref(),
                reference,
                force,
                self.reporter.as_ref(),
            )
            .await
        }
        .await;

        self.finish(reference, &store_ref, &result).await;
        result
    }

    /// Pull the runtime module, then the devel module if the remote has one.
    pub async fn pull_all(&self, reference: &Reference, force: bool) -> Result<()> {
        self.pull(&reference.with_module(Module::runtime()), force)
            .await?;

        let devel = reference.with_module(Module::devel());
        if let Err(e) = self.pull(&devel, force).await {
            warn!(reference = %devel, error = %e, "devel module not pulled");
        }
        Ok(())
    }

    /// Pull `reference` from `url` through a disposable staging store.
    pub async fn pull_isolated(&self, url: &str, reference: &Reference) -> Result<ObjectId> {
        let store_ref = reference.to_store_ref();
        self.jobs.register(&store_ref).await?;
        self.reporter.section("Pulling");

        let result = pull_isolated(&self.repo, url, reference, self.reporter.as_ref()).await;

        self.finish(reference, &store_ref, &result).await;
        result
    }

    /// Upload `reference` to the default repo of the remote service.
    pub async fn push(&self, reference: &Reference) -> Result<()> {
        let store_ref = reference.to_store_ref();
        self.jobs.register(&store_ref).await?;
        self.reporter.section("Pushing");

        let result = async {
            let credentials = match &self.credentials {
                Some(c) => c.clone(),
                None => Credentials::from_env()?,
            };
            push_with(
                &self.repo,
                self.remote.as_ref(),
                &credentials,
                reference,
                self.poll_interval,
                self.reporter.as_ref(),
            )
            .await
        }
        .await;

        self.finish(reference, &store_ref, &result).await;
        result
    }

    /// Delete the ref for `reference` and every object no other ref needs.
    pub fn delete_ref_data(&self, reference: &Reference) -> Result<PruneStats> {
        self.repo.delete_ref(reference)?;
        let stats = self.repo.prune()?;
        info!(
            %reference,
            pruned = stats.objects_pruned,
            bytes = stats.bytes_freed,
            "ref data deleted"
        );
        Ok(stats)
    }

    async fn finish<T>(&self, reference: &Reference, store_ref: &str, result: &Result<T>) {
        if let Err(e) = result {
            self.reporter.failed(reference, &e.to_string());
        }
        if let Err(e) = self.jobs.release(store_ref).await {
            warn!(store_ref, error = %e, "job not released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRemote;
    use ll_schema::DEFAULT_REPO_NAME;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    fn reference() -> Reference {
        Reference::parse("org.deepin.demo/1.0.0/x86_64").unwrap()
    }

    fn tree(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("file"), content).unwrap();
    }

    /// An upstream store and an engine whose default remote points at it.
    fn engine_with_upstream(remote: FakeRemote) -> (TempDir, LocalRepo, SyncEngine) {
        let dir = tempdir().unwrap();
        let up = LocalRepo::open(&dir.path().join("up"), RepoConfig::default()).unwrap();
        let src = dir.path().join("src");
        tree(&src.join("runtime"), "runtime");
        tree(&src.join("devel"), "devel");
        up.import_directory(&reference(), &src.join("runtime")).unwrap();
        up.import_directory(&reference().with_module(Module::devel()), &src.join("devel"))
            .unwrap();

        let mut local = LocalRepo::open(&dir.path().join("local"), RepoConfig::default()).unwrap();
        local
            .remote_add(
                DEFAULT_REPO_NAME,
                &format!("file://{}", up.repo_dir().display()),
            )
            .unwrap();
        let engine = SyncEngine::new(local, Box::new(remote));
        (dir, up, engine)
    }

    #[tokio::test]
    async fn pull_all_fetches_both_modules() {
        let (dir, _up, engine) = engine_with_upstream(FakeRemote::default());
        engine.pull_all(&reference(), false).await.unwrap();

        let out = dir.path().join("out");
        engine.repo().checkout_all(&reference(), "", &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("file")).unwrap(), "devel");
        assert!(engine.jobs().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pull_all_tolerates_missing_devel() {
        let (_dir, up, engine) = engine_with_upstream(FakeRemote::default());
        up.delete_ref(&reference().with_module(Module::devel())).unwrap();

        engine.pull_all(&reference(), false).await.unwrap();
        assert_eq!(engine.repo().list_local_refs().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pull_releases_job_on_failure() {
        let (_dir, _up, engine) = engine_with_upstream(FakeRemote::default());
        let missing = Reference::parse("org.other/1.0.0/x86_64").unwrap();
        assert!(engine.pull(&missing, false).await.is_err());
        assert!(engine.jobs().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_job_on_same_ref_is_rejected() {
        let (_dir, _up, engine) = engine_with_upstream(FakeRemote::default());
        engine.jobs().register(&reference().to_store_ref()).await.unwrap();
        let err = engine.pull(&reference(), false).await.unwrap_err();
        assert!(matches!(err, crate::RepoError::Transaction { .. }));
    }

    #[tokio::test]
    async fn delete_ref_data_prunes() {
        let (_dir, _up, engine) = engine_with_upstream(FakeRemote::default());
        engine.pull(&reference(), false).await.unwrap();

        let stats = engine.delete_ref_data(&reference()).unwrap();
        assert!(stats.objects_pruned > 0);
        assert!(stats.bytes_freed > 0);
        assert!(engine.repo().list_local_refs().unwrap().is_empty());
        assert!(engine.delete_ref_data(&reference()).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn push_uses_configured_credentials() {
        let remote = FakeRemote::default().with_statuses(vec![
            crate::remote::UploadTaskStatus::Pending,
            crate::remote::UploadTaskStatus::Complete,
        ]);
        let (_dir, _up, engine) = engine_with_upstream(remote);
        engine.pull(&reference(), false).await.unwrap();
        let engine = engine
            .with_credentials(Credentials::new("alice", "pw"))
            .with_poll_interval(Duration::ZERO);

        engine.push(&reference()).await.unwrap();
        assert!(engine.jobs().list().await.unwrap().is_empty());
    }

    #[test]
    fn set_config_repoints_remote() {
        let (_dir, _up, mut engine) = engine_with_upstream(FakeRemote::default());
        let before = engine.repo().config().clone();
        engine.set_config(before).unwrap();

        let mut repos = BTreeMap::new();
        repos.insert("beta".to_string(), "https://beta.example.com".to_string());
        let config = RepoConfig {
            version: 1,
            default_repo: "beta".to_string(),
            repos,
        };
        engine.set_config(config.clone()).unwrap();
        assert_eq!(engine.repo().config(), &config);
        assert_eq!(
            engine.repo().remote_show_url("beta").unwrap(),
            "https://beta.example.com/repos/beta"
        );
    }
}
