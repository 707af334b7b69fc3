//! Scripted [`RemoteApi`] double shared by resolver and sync tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ll_schema::{FuzzyReference, Reference, RemotePackage};

use crate::error::{RepoError, Result};
use crate::remote::{RemoteApi, RepoInfo, UploadTaskStatus};

#[derive(Debug, Default)]
pub(crate) struct FakeRemote {
    /// Search answers keyed by queried channel.
    pub search: HashMap<String, Vec<RemotePackage>>,
    pub statuses: Mutex<VecDeque<UploadTaskStatus>>,
    pub queries: Mutex<Vec<FuzzyReference>>,
    pub uploads: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub uploaded_sizes: Mutex<Vec<u64>>,
    pub endpoint: String,
}

impl FakeRemote {
    pub(crate) fn with_search(mut self, channel: &str, candidates: &[(&str, &str)]) -> Self {
        let found = candidates
            .iter()
            .map(|(version, arch)| RemotePackage {
                app_id: "org.deepin.demo".to_string(),
                name: "demo".to_string(),
                version: (*version).to_string(),
                arch: (*arch).to_string(),
                channel: String::new(),
                module: None,
            })
            .collect();
        self.search.insert(channel.to_string(), found);
        self
    }

    pub(crate) fn with_statuses(self, statuses: Vec<UploadTaskStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub(crate) fn queried_channels(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.channel_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn sign_in(&self, username: &str, _password: &str) -> Result<String> {
        if username.is_empty() {
            return Err(RepoError::remote("bad credentials", 401));
        }
        Ok(format!("token-{username}"))
    }

    async fn fuzzy_search(
        &self,
        query: &FuzzyReference,
        _repo_name: &str,
    ) -> Result<Vec<RemotePackage>> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self
            .search
            .get(query.channel_or_default())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_repo(&self, name: &str) -> Result<RepoInfo> {
        Ok(RepoInfo {
            name: name.to_string(),
            extra: serde_json::Map::new(),
        })
    }

    async fn new_upload_task(
        &self,
        _token: &str,
        reference: &Reference,
        _repo_name: &str,
    ) -> Result<String> {
        Ok(format!("task-{}", reference.app_id))
    }

    async fn upload_task_file(&self, _token: &str, _task_id: &str, file: &Path) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let size = std::fs::metadata(file)?.len();
        self.uploaded_sizes.lock().unwrap().push(size);
        Ok(())
    }

    async fn upload_task_info(&self, _token: &str, _task_id: &str) -> Result<UploadTaskStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UploadTaskStatus::Pending))
    }

    fn set_endpoint(&mut self, endpoint: &str) {
        self.endpoint = endpoint.to_string();
    }
}
