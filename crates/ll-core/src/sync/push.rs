//! Uploading a stored ref to the remote repository service.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use ll_schema::Reference;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{RepoError, Result};
use crate::remote::{RemoteApi, UploadTaskStatus};
use crate::reporter::Reporter;
use crate::store::{LocalRepo, Repo};

/// Environment variable holding the upload user name.
pub const USERNAME_ENV: &str = "LL_USERNAME";
/// Environment variable holding the upload password.
pub const PASSWORD_ENV: &str = "LL_PASSWORD";

/// Credentials for `sign_in`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Credentials pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read `LL_USERNAME` and `LL_PASSWORD`.
    ///
    /// # Errors
    ///
    /// `NotFound` if either is unset or empty.
    pub fn from_env() -> Result<Self> {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RepoError::NotFound(format!("environment variable {key}")))
        };
        Ok(Self::new(read(USERNAME_ENV)?, read(PASSWORD_ENV)?))
    }
}

/// Checkout directory and archive for one push, inside a private directory
/// under the push staging area. Removed on drop.
#[derive(Debug)]
struct PushStaging {
    root: Option<TempDir>,
    dir: PathBuf,
    archive: PathBuf,
}

impl PushStaging {
    fn new(base: &Path, app_id: &str) -> Result<Self> {
        std::fs::create_dir_all(base)?;
        let root = tempfile::Builder::new()
            .prefix(&format!("{app_id}-"))
            .tempdir_in(base)?;
        Ok(Self {
            dir: root.path().join(app_id),
            archive: root.path().join(format!("{app_id}.tgz")),
            root: Some(root),
        })
    }
}

impl Drop for PushStaging {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            if let Err(e) = root.close() {
                warn!(path = %path.display(), error = %e, "failed to remove push staging");
            }
        }
    }
}

/// Write `src` as a gzip-compressed tar stream to `dest`.
pub fn compress_dir(src: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", src)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Push `reference` from `repo` through `remote`.
///
/// Signs in, opens an upload task in the configured default repo, checks the
/// ref out under `<root>/cache/push/`, uploads it as a `.tgz` and polls the
/// task every `poll_interval` until it completes or fails. Polling has no
/// deadline. Staging files are removed however the push ends.
///
/// # Errors
///
/// `Protocol` if the task fails; any error from the remote calls, the
/// checkout or the archive step.
pub async fn push_with(
    repo: &LocalRepo,
    remote: &dyn RemoteApi,
    credentials: &Credentials,
    reference: &Reference,
    poll_interval: Duration,
    reporter: &dyn Reporter,
) -> Result<()> {
    let repo_name = repo.config().default_repo.clone();

    let token = remote
        .sign_in(&credentials.username, &credentials.password)
        .await?;
    remote.get_repo(&repo_name).await?;
    let task_id = remote
        .new_upload_task(&token, reference, &repo_name)
        .await?;
    debug!(%reference, task = %task_id, "upload task created");

    let staging = PushStaging::new(&repo.layout().push_staging_dir(), &reference.app_id)?;
    repo.checkout(reference, "", &staging.dir)?;
    reporter.progress(reference, 10, "Compressing");

    let (src, dest) = (staging.dir.clone(), staging.archive.clone());
    tokio::task::spawn_blocking(move || compress_dir(&src, &dest))
        .await
        .map_err(|e| RepoError::transaction(format!("compress task: {e}")))??;

    reporter.progress(reference, 30, "Uploading");
    remote
        .upload_task_file(&token, &task_id, &staging.archive)
        .await?;

    loop {
        match remote.upload_task_info(&token, &task_id).await? {
            UploadTaskStatus::Complete => {
                info!(%reference, task = %task_id, "upload complete");
                reporter.done(reference, "uploaded");
                return Ok(());
            }
            UploadTaskStatus::Failed(reason) => {
                reporter.failed(reference, &reason);
                return Err(RepoError::Protocol(format!(
                    "upload task {task_id} failed: {reason}"
                )));
            }
            status => {
                reporter.progress(reference, 50, &format!("Uploading: {status}"));
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
