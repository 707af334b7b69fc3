//! Remote repository API client.
//!
//! The server wraps every response in a `{code, msg, data}` envelope; `code`
//! mirrors the HTTP status. Authenticated calls carry the token in `X-Token`.

use std::path::Path;

use async_trait::async_trait;
use ll_schema::{FuzzyReference, Reference, RemotePackage};
use reqwest::header;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, Result};

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "X-Token";

/// State of a server-side upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTaskStatus {
    /// Queued.
    Pending,
    /// Being processed.
    InProgress,
    /// Imported into the remote repository.
    Complete,
    /// Rejected; carries the server's reason when given.
    Failed(String),
    /// Any status this client does not know; polling continues.
    Other(String),
}

impl UploadTaskStatus {
    /// Map the server's status string.
    pub fn from_wire(status: &str, reason: Option<String>) -> Self {
        match status {
            "pending" => Self::Pending,
            "in-progress" | "processing" | "running" => Self::InProgress,
            "complete" => Self::Complete,
            "failed" => Self::Failed(reason.unwrap_or_default()),
            other => Self::Other(other.to_string()),
        }
    }

    /// `complete` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

impl std::fmt::Display for UploadTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::InProgress => f.write_str("in-progress"),
            Self::Complete => f.write_str("complete"),
            Self::Failed(_) => f.write_str("failed"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Repository description returned by `get_repo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Repository name.
    pub name: String,
    /// Anything else the server sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Calls the sync engine and resolver make against the remote catalog and
/// upload service.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Exchange credentials for a session token.
    async fn sign_in(&self, username: &str, password: &str) -> Result<String>;

    /// Candidates matching `query` in repository `repo_name`.
    async fn fuzzy_search(&self, query: &FuzzyReference, repo_name: &str)
    -> Result<Vec<RemotePackage>>;

    /// Look up a repository by name.
    async fn get_repo(&self, name: &str) -> Result<RepoInfo>;

    /// Open an upload task for `reference`; returns the task id.
    async fn new_upload_task(&self, token: &str, reference: &Reference, repo_name: &str)
    -> Result<String>;

    /// Attach the archive at `file` to a task.
    async fn upload_task_file(&self, token: &str, task_id: &str, file: &Path) -> Result<()>;

    /// Current state of a task.
    async fn upload_task_info(&self, token: &str, task_id: &str) -> Result<UploadTaskStatus>;

    /// Point the client at another server.
    fn set_endpoint(&mut self, endpoint: &str);
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: i32,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct TokenData {
    token: String,
}

#[derive(Deserialize)]
struct TaskData {
    id: String,
}

#[derive(Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    app_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arch: Option<&'a str>,
    channel: &'a str,
    repo_name: &'a str,
}

/// Build an HTTP client. `http2 = false` restricts it to HTTP/1.1.
pub fn build_client(http2: bool) -> Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static(crate::USER_AGENT),
    );

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if !http2 {
        builder = builder.http1_only();
    }
    Ok(builder.build()?)
}

/// [`RemoteApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemote {
    /// Client for the server at `endpoint`, HTTP/1.1 only.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(false)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Current server.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>> {
        let status = resp.status();
        let body = resp.bytes().await?;

        let Ok(envelope) = serde_json::from_slice::<Envelope<T>>(&body) else {
            if status.is_success() {
                return Err(RepoError::InvalidData(format!(
                    "unexpected response body: {}",
                    String::from_utf8_lossy(&body)
                )));
            }
            return Err(RepoError::remote(
                String::from_utf8_lossy(&body).into_owned(),
                i32::from(status.as_u16()),
            ));
        };

        if !status.is_success() {
            return Err(RepoError::remote(envelope.msg, i32::from(status.as_u16())));
        }
        if envelope.code != 200 {
            return Err(RepoError::remote(envelope.msg, envelope.code));
        }
        Ok(envelope.data)
    }

    fn missing(what: &str) -> RepoError {
        RepoError::InvalidData(format!("response without {what}"))
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn sign_in(&self, username: &str, password: &str) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/api/v1/sign-in"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let data: TokenData = Self::read_envelope(resp).await?.ok_or_else(|| Self::missing("token"))?;
        debug!(username, "signed in");
        Ok(data.token)
    }

    async fn fuzzy_search(
        &self,
        query: &FuzzyReference,
        repo_name: &str,
    ) -> Result<Vec<RemotePackage>> {
        let arch = query.arch.map(|a| a.as_str());
        let body = SearchRequest {
            app_id: &query.app_id,
            version: query.version.as_deref(),
            arch,
            channel: query.channel_or_default(),
            repo_name,
        };
        let resp = self
            .client
            .post(self.url("/api/v0/app/fuzzy-search"))
            .json(&body)
            .send()
            .await?;
        Ok(Self::read_envelope(resp).await?.unwrap_or_default())
    }

    async fn get_repo(&self, name: &str) -> Result<RepoInfo> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/repos/{name}")))
            .send()
            .await?;
        Self::read_envelope(resp).await?.ok_or_else(|| Self::missing("repo"))
    }

    async fn new_upload_task(
        &self,
        token: &str,
        reference: &Reference,
        repo_name: &str,
    ) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/api/v1/upload-tasks"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({
                "ref": reference.to_store_ref(),
                "repoName": repo_name,
            }))
            .send()
            .await?;
        let data: TaskData = Self::read_envelope(resp).await?.ok_or_else(|| Self::missing("task id"))?;
        Ok(data.id)
    }

    async fn upload_task_file(&self, token: &str, task_id: &str, file: &Path) -> Result<()> {
        let source = tokio::fs::File::open(file).await?;
        let len = source.metadata().await?.len();
        let name = file
            .file_name()
            .map_or_else(|| "upload.tgz".to_string(), |n| n.to_string_lossy().into_owned());
        debug!(file = %file.display(), bytes = len, task = task_id, "uploading");
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::stream_with_length(reqwest::Body::from(source), len)
                .file_name(name),
        );
        let resp = self
            .client
            .put(self.url(&format!("/api/v1/upload-tasks/{task_id}/tar")))
            .header(TOKEN_HEADER, token)
            .multipart(form)
            .send()
            .await?;
        Self::read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    async fn upload_task_info(&self, token: &str, task_id: &str) -> Result<UploadTaskStatus> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/upload-tasks/{task_id}/status")))
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        let data: StatusData = Self::read_envelope(resp).await?.ok_or_else(|| Self::missing("status"))?;
        Ok(UploadTaskStatus::from_wire(&data.status, data.msg))
    }

    fn set_endpoint(&mut self, endpoint: &str) {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
    }
}
