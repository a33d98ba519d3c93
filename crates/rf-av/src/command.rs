//! Builder for executing external tool commands.
//!
//! Two execution modes are offered:
//!
//! - [`ToolCommand::execute`] captures stdout/stderr and enforces the
//!   builder's timeout. Used for short calls such as version checks.
//! - [`ToolCommand::run_logged`] streams both output pipes line by line to
//!   `tracing` and resolves once the process is gone: either it exited on
//!   its own, or it was killed and reaped because the caller cancelled or
//!   the deadline passed.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// How a [`ToolCommand::run_logged`] process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEnd {
    /// The process exited by itself.
    Exited(ExitStatus),
    /// The cancellation token fired; the process was killed and reaped.
    Cancelled,
    /// The deadline passed; the process was killed and reaped.
    TimedOut,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use rf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> rf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-version")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            current_dir: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time used by [`execute`](Self::execute).
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Run the process with the given working directory.
    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Returns [`rf_core::Error::Tool`] if the process times out (message
    ///   includes the timeout duration). The child is killed.
    /// - Returns [`rf_core::Error::Tool`] if the process exits with a non-zero
    ///   status (message includes stderr).
    /// - Returns [`rf_core::Error::Tool`] if spawning the process fails.
    pub async fn execute(&self) -> rf_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let child = self.command().spawn().map_err(|e| {
            rf_core::Error::tool(program_name.clone(), format!("failed to spawn: {e}"))
        })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(rf_core::Error::tool(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(rf_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            // The wait future owned the child; dropping it kills the process.
            Err(_elapsed) => Err(rf_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Spawn the command, forward its output to the log, and wait for it to
    /// end.
    ///
    /// The exit status is returned as-is; a non-zero exit is not an error
    /// here. Output lines are emitted at debug level under the
    /// `rf_av::process` target and are never interpreted.
    ///
    /// If `cancel` fires or `deadline` elapses first, the child is killed and
    /// waited for before this returns, so the process no longer exists when
    /// the caller sees [`ProcessEnd::Cancelled`] or [`ProcessEnd::TimedOut`].
    ///
    /// # Errors
    ///
    /// Returns [`rf_core::Error::Tool`] if the process cannot be spawned or
    /// waited on.
    pub async fn run_logged(
        &self,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> rf_core::Result<ProcessEnd> {
        let program_name = self.program_name();

        tracing::debug!(tool = %program_name, args = ?self.args, "spawning");

        let mut child = self.command().spawn().map_err(|e| {
            rf_core::Error::tool(program_name.clone(), format!("failed to spawn: {e}"))
        })?;

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(program_name.clone(), stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(program_name.clone(), stderr)));
        }

        let stopped = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    rf_core::Error::tool(
                        program_name.clone(),
                        format!("I/O error waiting for process: {e}"),
                    )
                })?;
                for handle in forwarders {
                    let _ = handle.await;
                }
                tracing::debug!(tool = %program_name, %status, "process exited");
                return Ok(ProcessEnd::Exited(status));
            }
            _ = cancel.cancelled() => ProcessEnd::Cancelled,
            _ = tokio::time::sleep(deadline) => ProcessEnd::TimedOut,
        };

        // `kill` sends the signal and then waits, so the child is reaped here.
        if let Err(e) = child.kill().await {
            tracing::warn!(tool = %program_name, "failed to kill process: {e}");
        }
        // Pipes may be held open by grandchildren; stop reading them.
        for handle in forwarders {
            handle.abort();
        }

        tracing::debug!(tool = %program_name, outcome = ?stopped, "process stopped");
        Ok(stopped)
    }
}

async fn forward_lines(tool: String, pipe: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "rf_av::process", tool = %tool, "{line}");
    }
}
