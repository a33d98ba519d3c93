//! The process-execution seam of the pipeline.
//!
//! A [`Transformer`] runs one [`Invocation`] and reports how it ended. The
//! pipeline hands it the job's cancellation token and the time budget; when
//! either one cuts the run short, the process must be gone before `run`
//! returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rf_av::{ProcessEnd, ToolRegistry};
use rf_core::Result;

use crate::invocation::Invocation;

/// How the external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

/// How a transformer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The process exited by itself.
    Exited(ExitOutcome),
    /// Stopped because the job was cancelled.
    Cancelled,
    /// Stopped because the time budget ran out.
    TimedOut,
}

impl From<ProcessEnd> for RunEnd {
    fn from(end: ProcessEnd) -> Self {
        match end {
            ProcessEnd::Exited(status) => Self::Exited(ExitOutcome {
                code: status.code(),
            }),
            ProcessEnd::Cancelled => Self::Cancelled,
            ProcessEnd::TimedOut => Self::TimedOut,
        }
    }
}

/// Runs external transformation processes.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Executable the pipeline should put in its invocations.
    fn program(&self) -> &Path;

    /// Run the invocation until the process exits, `cancel` fires or
    /// `deadline` elapses. In the latter two cases the process has already
    /// terminated when this returns.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process could not be started or
    /// waited on. A non-zero exit is reported through [`RunEnd::Exited`].
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> Result<RunEnd>;
}

/// [`Transformer`] backed by a real ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegTransformer {
    program: PathBuf,
}

impl FfmpegTransformer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use the ffmpeg found by the registry.
    ///
    /// # Errors
    ///
    /// Returns [`rf_core::Error::Tool`] if ffmpeg was not discovered.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::new(tools.require("ffmpeg")?.path.clone()))
    }
}

#[async_trait]
impl Transformer for FfmpegTransformer {
    fn program(&self) -> &Path {
        &self.program
    }

    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> Result<RunEnd> {
        let end = invocation.to_command().run_logged(cancel, deadline).await?;
        Ok(end.into())
    }
}

/// Scripted stand-in for ffmpeg, for tests that must not depend on a real
/// binary.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// What a [`ScriptedTransformer`] does when run.
    #[derive(Debug, Clone)]
    pub enum Behavior {
        /// Write these bytes to the requested output and exit 0.
        WriteOutput(Vec<u8>),
        /// Exit 0 without writing anything.
        NoOutput,
        /// Write a partial output, then exit with this code.
        Exit(i32),
        /// Write a partial output, then run until stopped.
        Hang,
        /// Fail to start.
        SpawnError(String),
    }

    /// A [`Transformer`] whose outcome is fixed up front.
    ///
    /// It records every invocation it receives and the peak number of runs
    /// that were in flight at once.
    #[derive(Debug)]
    pub struct ScriptedTransformer {
        behavior: Behavior,
        delay: Duration,
        invocations: Mutex<Vec<Invocation>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedTransformer {
        pub fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                delay: Duration::ZERO,
                invocations: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        /// Succeed with a small fake result.
        pub fn succeeding() -> Self {
            Self::new(Behavior::WriteOutput(b"transcoded".to_vec()))
        }

        /// Sleep this long before acting out the behaviour.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Every invocation received so far, in order.
        pub fn invocations(&self) -> Vec<Invocation> {
            self.invocations.lock().clone()
        }

        /// Highest number of concurrent runs observed.
        pub fn peak_concurrency(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    struct RunningGuard<'a>(&'a AtomicUsize);

    impl Drop for RunningGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn output_path(invocation: &Invocation) -> PathBuf {
        let name = invocation.args.last().cloned().unwrap_or_default();
        invocation.working_dir.join(name)
    }

    impl ScriptedTransformer {
        async fn act(&self, invocation: &Invocation) -> Result<RunEnd> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let output = output_path(invocation);
            let code = match &self.behavior {
                Behavior::WriteOutput(bytes) => {
                    tokio::fs::write(&output, bytes).await?;
                    0
                }
                Behavior::NoOutput => 0,
                Behavior::Exit(code) => {
                    tokio::fs::write(&output, b"partial").await?;
                    *code
                }
                Behavior::Hang => {
                    tokio::fs::write(&output, b"partial").await?;
                    std::future::pending().await
                }
                Behavior::SpawnError(message) => {
                    return Err(rf_core::Error::tool("ffmpeg", message.clone()));
                }
            };
            Ok(RunEnd::Exited(ExitOutcome { code: Some(code) }))
        }
    }

    #[async_trait]
    impl Transformer for ScriptedTransformer {
        fn program(&self) -> &Path {
            Path::new("ffmpeg")
        }

        async fn run(
            &self,
            invocation: &Invocation,
            cancel: &CancellationToken,
            deadline: Duration,
        ) -> Result<RunEnd> {
            self.invocations.lock().push(invocation.clone());

            if let Behavior::SpawnError(message) = &self.behavior {
                return Err(rf_core::Error::tool("ffmpeg", message.clone()));
            }

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = RunningGuard(&self.running);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Ok(RunEnd::Cancelled),
                _ = tokio::time::sleep(deadline) => Ok(RunEnd::TimedOut),
                end = self.act(invocation) => end,
            }
        }
    }
}
