//! Job tracker actor
//!
//! Tracks which refs have a pull or push in flight. The map is owned by one
//! background thread; every other party talks to it through [`JobTracker`]
//! handles, so no lock is shared.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{RepoError, Result};

/// Identifier handed out for a registered job.
pub type JobId = u64;

enum JobEvent {
    Register {
        store_ref: String,
        resp: oneshot::Sender<Option<JobId>>,
    },
    Release {
        store_ref: String,
        resp: oneshot::Sender<bool>,
    },
    Find {
        pattern: String,
        exact: bool,
        resp: oneshot::Sender<Option<(String, JobId)>>,
    },
    List {
        resp: oneshot::Sender<Vec<(String, JobId)>>,
    },
}

/// A handle to the job tracker thread. Cheap to clone; the thread exits when
/// the last handle is dropped.
#[derive(Debug, Clone)]
pub struct JobTracker {
    sender: mpsc::Sender<JobEvent>,
}

impl std::fmt::Debug for JobEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { store_ref, .. } => write!(f, "Register({store_ref})"),
            Self::Release { store_ref, .. } => write!(f, "Release({store_ref})"),
            Self::Find { pattern, exact, .. } => write!(f, "Find({pattern}, exact={exact})"),
            Self::List { .. } => f.write_str("List"),
        }
    }
}

impl JobTracker {
    /// Spawn the tracker thread.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || run_job_event_loop(&receiver));
        Self { sender }
    }

    /// Helper to send a request and wait for the response
    async fn request<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> JobEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(f(tx))
            .map_err(|_| RepoError::transaction("job tracker stopped"))?;
        rx.await
            .map_err(|_| RepoError::transaction("job tracker stopped"))
    }

    /// Record a job for `store_ref`.
    ///
    /// # Errors
    ///
    /// `Transaction` if a job for the same ref is already running.
    pub async fn register(&self, store_ref: &str) -> Result<JobId> {
        let store_ref = store_ref.to_string();
        let name = store_ref.clone();
        self.request(|resp| JobEvent::Register { store_ref, resp })
            .await?
            .ok_or_else(|| RepoError::transaction(format!("{name} is already in progress")))
    }

    /// Forget the job for `store_ref`. Returns whether one was registered.
    pub async fn release(&self, store_ref: &str) -> Result<bool> {
        let store_ref = store_ref.to_string();
        self.request(|resp| JobEvent::Release { store_ref, resp })
            .await
    }

    /// Job whose ref equals `store_ref`.
    pub async fn find_exact(&self, store_ref: &str) -> Result<Option<(String, JobId)>> {
        let pattern = store_ref.to_string();
        self.request(|resp| JobEvent::Find {
            pattern,
            exact: true,
            resp,
        })
        .await
    }

    /// First job (in ref order) whose ref contains `fragment`.
    pub async fn find(&self, fragment: &str) -> Result<Option<(String, JobId)>> {
        let pattern = fragment.to_string();
        self.request(|resp| JobEvent::Find {
            pattern,
            exact: false,
            resp,
        })
        .await
    }

    /// All jobs in flight, sorted by ref.
    pub async fn list(&self) -> Result<Vec<(String, JobId)>> {
        self.request(|resp| JobEvent::List { resp }).await
    }
}

fn run_job_event_loop(receiver: &mpsc::Receiver<JobEvent>) {
    let mut jobs: BTreeMap<String, JobId> = BTreeMap::new();
    let mut next_id: JobId = 1;

    while let Ok(event) = receiver.recv() {
        debug!(?event, "job tracker");
        match event {
            JobEvent::Register { store_ref, resp } => {
                let id = if jobs.contains_key(&store_ref) {
                    None
                } else {
                    let id = next_id;
                    next_id += 1;
                    jobs.insert(store_ref, id);
                    Some(id)
                };
                let _ = resp.send(id);
            }
            JobEvent::Release { store_ref, resp } => {
                let _ = resp.send(jobs.remove(&store_ref).is_some());
            }
            JobEvent::Find {
                pattern,
                exact,
                resp,
            } => {
                let found = if exact {
                    jobs.get_key_value(&pattern)
                        .map(|(k, v)| (k.clone(), *v))
                } else {
                    jobs.iter()
                        .find(|(k, _)| k.contains(&pattern))
                        .map(|(k, v)| (k.clone(), *v))
                };
                let _ = resp.send(found);
            }
            JobEvent::List { resp } => {
                let _ = resp.send(jobs.iter().map(|(k, v)| (k.clone(), *v)).collect());
            }
        }
    }
}
