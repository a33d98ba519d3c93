//! In-memory job bookkeeping.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use rf_core::{Error, JobId, Result};

use crate::job::Job;

struct Entry {
    job: Job,
    cancel: CancellationToken,
    /// Flips to `true` once the job reaches a terminal state.
    done: watch::Sender<bool>,
}

/// Concurrent map of job records with their cancellation handles.
#[derive(Default)]
pub struct JobStore {
    entries: RwLock<HashMap<JobId, Entry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new job.
    pub fn insert(&self, job: Job, cancel: CancellationToken) {
        let (done, _) = watch::channel(job.status.is_terminal());
        self.entries
            .write()
            .insert(job.id, Entry { job, cancel, done });
    }

    /// Snapshot of a job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.entries.read().get(&id).map(|e| e.job.clone())
    }

    /// Snapshots of every job, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.entries.read().values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Apply `f` to the job under the write lock.
    ///
    /// Waiters are released if `f` leaves the job in a terminal state.
    pub fn update<T>(&self, id: JobId, f: impl FnOnce(&mut Job) -> Result<T>) -> Result<T> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("job", id))?;

        let out = f(&mut entry.job)?;
        if entry.job.status.is_terminal() {
            entry.done.send_replace(true);
        }
        Ok(out)
    }

    /// The job's cancellation token.
    pub fn cancel_token(&self, id: JobId) -> Option<CancellationToken> {
        self.entries.read().get(&id).map(|e| e.cancel.clone())
    }

    /// A receiver that observes `true` once the job is terminal.
    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<bool>> {
        self.entries.read().get(&id).map(|e| e.done.subscribe())
    }

    /// Ids of jobs that have not reached a terminal state.
    pub fn pending(&self) -> Vec<JobId> {
        self.entries
            .read()
            .values()
            .filter(|e| !e.job.status.is_terminal())
            .map(|e| e.job.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}
