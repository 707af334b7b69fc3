//! Where a pull reads refs and objects from.
//!
//! A remote store is served read-only with the same layout as a local one:
//! `refs/heads/<store ref>` holds a commit id and
//! `objects/<prefix>/<id>.<kind>` holds object bytes. `http(s)://` remotes are
//! fetched over HTTP, `file://` remotes are read straight from disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ll_schema::ObjectId;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::RemoteSection;
use crate::error::{RepoError, Result};
use crate::remote::build_client;
use crate::store::ObjectKind;
use crate::store::ObjectStore;
use crate::store::refs::RefStore;

/// Read side of a remote store.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Commit the remote ref points at, `None` if it has no such ref.
    async fn read_ref(&self, store_ref: &str) -> Result<Option<ObjectId>>;

    /// Raw bytes of one object.
    async fn fetch(&self, id: &ObjectId, kind: ObjectKind) -> Result<Vec<u8>>;

    /// Location for log messages.
    fn describe(&self) -> String;
}

/// Remote store served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base: String,
}

impl HttpSource {
    /// Source rooted at `base` (e.g. `https://host/repos/stable`).
    pub fn new(base: &str, http2: bool) -> Result<Self> {
        Ok(Self {
            client: build_client(http2)?,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectSource for HttpSource {
    async fn read_ref(&self, store_ref: &str) -> Result<Option<ObjectId>> {
        let url = format!("{}/refs/heads/{store_ref}", self.base);
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body = resp.text().await?;
        ObjectId::parse(body.trim())
            .map(Some)
            .map_err(|e| RepoError::InvalidData(format!("{url}: {e}")))
    }

    async fn fetch(&self, id: &ObjectId, kind: ObjectKind) -> Result<Vec<u8>> {
        let url = format!(
            "{}/objects/{}/{id}.{}",
            self.base,
            id.prefix(),
            kind.extension()
        );
        debug!(%url, "fetching object");
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound(format!("object {id} at {}", self.base)));
        }
        let bytes = resp.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

/// Another store on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    objects: ObjectStore,
    refs: RefStore,
}

impl FileSource {
    /// Open the store at `repo_dir`, following its parent chain for objects.
    pub fn open(repo_dir: &Path) -> Result<Self> {
        if !repo_dir.join("config.toml").is_file() {
            return Err(RepoError::NotFound(format!(
                "no store at {}",
                repo_dir.display()
            )));
        }
        Ok(Self {
            path: repo_dir.to_path_buf(),
            objects: ObjectStore::for_repo(repo_dir)?,
            refs: RefStore::new(repo_dir),
        })
    }
}

#[async_trait]
impl ObjectSource for FileSource {
    async fn read_ref(&self, store_ref: &str) -> Result<Option<ObjectId>> {
        self.refs.read(store_ref)
    }

    async fn fetch(&self, id: &ObjectId, kind: ObjectKind) -> Result<Vec<u8>> {
        self.objects.read(id, kind)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Build the source for a configured remote.
///
/// # Errors
///
/// `Transaction` when the remote asks for signature verification, which is
/// not supported; `InvalidData` for an unknown URL scheme.
pub fn source_for(remote: &RemoteSection) -> Result<Box<dyn ObjectSource>> {
    if remote.gpg_verify {
        return Err(RepoError::transaction(format!(
            "remote {} requires gpg verification",
            remote.url
        )));
    }

    if let Some(path) = remote.url.strip_prefix("file://") {
        return Ok(Box::new(FileSource::open(Path::new(path))?));
    }
    if remote.url.starts_with("http://") || remote.url.starts_with("https://") {
        return Ok(Box::new(HttpSource::new(&remote.url, remote.http2)?));
    }
    Err(RepoError::InvalidData(format!(
        "unsupported remote url {}",
        remote.url
    )))
}
