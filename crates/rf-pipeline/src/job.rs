//! Job records and their lifecycle.
//!
//! ```text
//! queued ──start──▶ running ──succeed──▶ succeeded
//!    │                 │
//!    └──────fail───────┴──────fail─────▶ failed
//! ```
//!
//! Every transition goes through a method on [`Job`], which rejects moves
//! that are not on the diagram with [`Error::InvalidState`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rf_core::{Error, JobId, Result};

use crate::params::TranscodeParams;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The process exited non-zero. `code` is absent when it was killed by a
    /// signal.
    ExitCode { code: Option<i32> },
    /// The process ran past the configured limit and was killed.
    TimedOut { after_secs: u64 },
    /// The process exited cleanly but left no usable result.
    MissingOutput,
    /// The caller cancelled the job.
    Cancelled,
    /// A staging filesystem operation failed.
    Resource { message: String },
    /// The process could not be started.
    Spawn { message: String },
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitCode { code: Some(code) } => write!(f, "transcoder exited with code {code}"),
            Self::ExitCode { code: None } => write!(f, "transcoder was terminated by a signal"),
            Self::TimedOut { after_secs } => {
                write!(f, "transcoder timed out after {after_secs}s")
            }
            Self::MissingOutput => write!(f, "transcoder exited successfully but produced no output"),
            Self::Cancelled => write!(f, "job was cancelled"),
            Self::Resource { message } => write!(f, "staging failed: {message}"),
            Self::Spawn { message } => write!(f, "could not start transcoder: {message}"),
        }
    }
}

impl From<JobFailure> for Error {
    fn from(failure: JobFailure) -> Self {
        match failure {
            JobFailure::Resource { message } => {
                Error::resource("stage job", std::io::Error::other(message))
            }
            other => Error::Execution(other.to_string()),
        }
    }
}

/// A transcoding job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source: PathBuf,
    pub params: TranscodeParams,
    pub status: JobStatus,
    /// Published result; present iff `status == succeeded`.
    pub result: Option<PathBuf>,
    /// Failure detail; present iff `status == failed`.
    pub error: Option<JobFailure>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh job in the `queued` state.
    pub fn new(source: PathBuf, params: TranscodeParams) -> Self {
        Self {
            id: JobId::new(),
            source,
            params,
            status: JobStatus::Queued,
            result: None,
            error: None,
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// `queued → running`.
    pub fn start(&mut self) -> Result<()> {
        self.expect(JobStatus::Queued, "start")?;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running → succeeded` with the published result.
    pub fn succeed(&mut self, result: PathBuf) -> Result<()> {
        self.expect(JobStatus::Running, "complete")?;
        self.status = JobStatus::Succeeded;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `queued | running → failed`.
    pub fn fail(&mut self, failure: JobFailure) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("fail"));
        }
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(failure);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Record the caller's wish to cancel a non-terminal job.
    pub fn request_cancel(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("cancel"));
        }
        self.cancel_requested = true;
        Ok(())
    }

    fn expect(&self, status: JobStatus, action: &str) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(self.illegal(action))
        }
    }

    fn illegal(&self, action: &str) -> Error {
        Error::InvalidState(format!("cannot {action} job {} in state {}", self.id, self.status))
    }
}
