//! The transcoding job pipeline.
//!
//! [`Pipeline::submit`] validates a request, records a `queued` job and
//! spawns a task for it. The task waits for a concurrency permit, stages the
//! source into its own working directory, runs the transformer under the
//! configured timeout, and publishes the result or records why it failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use rf_av::JobWorkspace;
use rf_core::config::{PipelineConfig, StorageConfig};
use rf_core::events::{EventBus, EventPayload};
use rf_core::{Error, JobId, Result};

use crate::invocation::build_invocation;
use crate::job::{Job, JobFailure, JobStatus};
use crate::params::TranscodeParams;
use crate::store::JobStore;
use crate::transformer::{RunEnd, Transformer};

/// Handle to the job pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    outputs_dir: PathBuf,
    work_root: PathBuf,
    timeout: Duration,
    store: JobStore,
    transformer: Arc<dyn Transformer>,
    events: Arc<EventBus>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline over the given staging layout.
    ///
    /// The outputs and work directories are created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if a directory cannot be created.
    pub fn new(
        storage: &StorageConfig,
        limits: &PipelineConfig,
        transformer: Arc<dyn Transformer>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let work_root = storage.work_root();
        for dir in [&storage.outputs_dir, &work_root] {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::resource(format!("create {}", dir.display()), e))?;
        }

        let max_jobs = limits.max_concurrent_jobs.max(1);
        tracing::info!(
            max_jobs,
            timeout_secs = limits.job_timeout_secs,
            work_root = %work_root.display(),
            "pipeline ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                outputs_dir: storage.outputs_dir.clone(),
                work_root,
                timeout: limits.job_timeout(),
                store: JobStore::new(),
                transformer,
                events,
                permits: Arc::new(Semaphore::new(max_jobs)),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Queue a job and return its initial snapshot.
    ///
    /// Execution happens in the background; this never waits for it. Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the source is not a non-empty
    /// regular file or the parameters are unsupported. No job is recorded in
    /// that case.
    pub fn submit(&self, source: &Path, params: TranscodeParams) -> Result<Job> {
        params.validate()?;
        check_source(source)?;

        let job = Job::new(source.to_path_buf(), params);
        let id = job.id;
        let token = self.inner.shutdown.child_token();
        self.inner.store.insert(job.clone(), token.clone());

        tracing::info!(job_id = %id, source = %source.display(), format = %job.params.format, "job queued");
        self.inner.events.broadcast(EventPayload::JobQueued { job_id: id });

        tokio::spawn(run_job(self.inner.clone(), id, token));
        Ok(job)
    }

    /// Current snapshot of a job.
    pub fn status(&self, id: JobId) -> Result<Job> {
        self.inner
            .store
            .get(id)
            .ok_or_else(|| Error::not_found("job", id))
    }

    /// Cancel a job.
    ///
    /// A queued job fails immediately and never starts. A running job has
    /// its process killed and fails once the process is gone.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id; [`Error::InvalidState`] if the
    /// job already finished.
    pub fn cancel(&self, id: JobId) -> Result<Job> {
        let events = &self.inner.events;
        let job = self.inner.store.update(id, |job| {
            match job.status {
                JobStatus::Queued => {
                    job.request_cancel()?;
                    job.fail(JobFailure::Cancelled)?;
                }
                JobStatus::Running => job.request_cancel()?,
                JobStatus::Succeeded | JobStatus::Failed => {
                    return Err(Error::InvalidState(format!(
                        "job {id} already {}",
                        job.status
                    )));
                }
            }
            tracing::info!(job_id = %id, status = %job.status, "job cancellation requested");
            events.broadcast(EventPayload::JobCancelRequested { job_id: id });
            if job.status == JobStatus::Failed {
                events.broadcast(EventPayload::JobFailed {
                    job_id: id,
                    error: JobFailure::Cancelled.to_string(),
                });
            }
            Ok(job.clone())
        })?;

        if let Some(token) = self.inner.store.cancel_token(id) {
            token.cancel();
        }

        Ok(job)
    }

    /// Snapshots of every job, newest first.
    pub fn list(&self) -> Vec<Job> {
        self.inner.store.list()
    }

    /// Wait until a job is terminal and return its final snapshot.
    pub async fn wait(&self, id: JobId) -> Result<Job> {
        let mut rx = self
            .inner
            .store
            .subscribe(id)
            .ok_or_else(|| Error::not_found("job", id))?;
        rx.wait_for(|done| *done)
            .await
            .map_err(|_| Error::Internal(format!("job {id} tracking dropped")))?;
        self.status(id)
    }

    /// Cancel all outstanding work and wait for every job to settle.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let pending = self.inner.store.pending();
        if !pending.is_empty() {
            tracing::info!(jobs = pending.len(), "waiting for jobs to stop");
        }
        for id in pending {
            let _ = self.wait(id).await;
        }
    }

    /// Directory results are published to.
    pub fn outputs_dir(&self) -> &Path {
        &self.inner.outputs_dir
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("outputs_dir", &self.inner.outputs_dir)
            .field("work_root", &self.inner.work_root)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

fn check_source(source: &Path) -> Result<()> {
    let meta = std::fs::metadata(source).map_err(|_| {
        Error::invalid_input(format!("source {} does not exist", source.display()))
    })?;
    if !meta.is_file() {
        return Err(Error::invalid_input(format!(
            "source {} is not a regular file",
            source.display()
        )));
    }
    if meta.len() == 0 {
        return Err(Error::invalid_input(format!(
            "source {} is empty",
            source.display()
        )));
    }
    Ok(())
}

async fn run_job(inner: Arc<Inner>, id: JobId, token: CancellationToken) {
    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => {
            finish(&inner, id, Err(JobFailure::Cancelled));
            return;
        }
        permit = inner.permits.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                finish(&inner, id, Err(JobFailure::Resource {
                    message: "pipeline is shut down".into(),
                }));
                return;
            }
        },
    };

    // A cancel may have failed the job while it waited for the permit.
    let job = match inner.store.update(id, |job| {
        job.start()?;
        Ok(job.clone())
    }) {
        Ok(job) => job,
        Err(_) => return,
    };

    tracing::info!(job_id = %id, "job started");
    inner.events.broadcast(EventPayload::JobStarted { job_id: id });

    let outcome = execute(&inner, &job, &token).await;
    finish(&inner, id, outcome);
    drop(permit);
}

/// Stage, transform and publish. The working directory is gone by the time
/// this returns.
async fn execute(
    inner: &Inner,
    job: &Job,
    token: &CancellationToken,
) -> std::result::Result<PathBuf, JobFailure> {
    let id = job.id;
    let ext = job.params.format.extension();
    let result_name = format!("{id}.{ext}");

    let (workspace, source_name) = stage(inner.work_root.clone(), id, job.source.clone()).await?;

    if token.is_cancelled() {
        return Err(JobFailure::Cancelled);
    }

    let invocation = build_invocation(
        inner.transformer.program(),
        workspace.dir(),
        &source_name,
        &job.params,
    );
    tracing::debug!(job_id = %id, command = %invocation.command_line(), "running transformer");

    let run = inner
        .transformer
        .run(&invocation, token, inner.timeout)
        .await;

    // The process has exited by now, whichever way the run ended.
    let failure = match run {
        Err(e) => Some(JobFailure::Spawn {
            message: e.to_string(),
        }),
        Ok(RunEnd::Cancelled) => Some(JobFailure::Cancelled),
        Ok(RunEnd::TimedOut) => Some(JobFailure::TimedOut {
            after_secs: inner.timeout.as_secs(),
        }),
        Ok(RunEnd::Exited(_)) if token.is_cancelled() => Some(JobFailure::Cancelled),
        Ok(RunEnd::Exited(exit)) if !exit.success() => {
            Some(JobFailure::ExitCode { code: exit.code })
        }
        Ok(RunEnd::Exited(_)) if !workspace.has_output(ext) => Some(JobFailure::MissingOutput),
        Ok(RunEnd::Exited(_)) => None,
    };

    if let Some(failure) = failure {
        discard_partial(&inner.outputs_dir.join(&result_name));
        return Err(failure);
    }

    workspace
        .publish(ext, &inner.outputs_dir, &result_name)
        .map_err(|e| JobFailure::Resource {
            message: e.to_string(),
        })
}

/// Create the job directory and copy the source in, off the async threads.
async fn stage(
    work_root: PathBuf,
    id: JobId,
    source: PathBuf,
) -> std::result::Result<(JobWorkspace, String), JobFailure> {
    let staged = tokio::task::spawn_blocking(move || {
        let mut workspace = JobWorkspace::create(&work_root, id)?;
        let name = workspace.stage_source(&source)?.to_string();
        Ok::<_, Error>((workspace, name))
    })
    .await;

    match staged {
        Ok(Ok(staged)) => Ok(staged),
        Ok(Err(e)) => Err(JobFailure::Resource {
            message: e.to_string(),
        }),
        Err(e) => Err(JobFailure::Resource {
            message: format!("staging task failed: {e}"),
        }),
    }
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial result"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove partial result: {e}"),
    }
}

/// Record the terminal state unless something else already did.
///
/// The event is broadcast before waiters are released, so anyone returning
/// from [`Pipeline::wait`] can already see it.
fn finish(inner: &Inner, id: JobId, outcome: std::result::Result<PathBuf, JobFailure>) {
    let recorded = inner.store.update(id, |job| {
        let payload = match &outcome {
            Ok(result) => {
                job.succeed(result.clone())?;
                tracing::info!(job_id = %id, result = %result.display(), "job succeeded");
                EventPayload::JobSucceeded {
                    job_id: id,
                    result: result.display().to_string(),
                }
            }
            Err(failure) => {
                // Shutdown cancels through the token without going via `cancel`.
                if *failure == JobFailure::Cancelled {
                    job.request_cancel()?;
                }
                job.fail(failure.clone())?;
                tracing::warn!(job_id = %id, error = %failure, "job failed");
                EventPayload::JobFailed {
                    job_id: id,
                    error: failure.to_string(),
                }
            }
        };
        inner.events.broadcast(payload);
        Ok(())
    });

    if let Err(e) = recorded {
        tracing::debug!(job_id = %id, "outcome not recorded: {e}");
    }
}
