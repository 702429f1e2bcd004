//! Builder for executing external tool commands with timeout support.
//!
//! [`ToolCommand::execute`] is the short-lived form used for probing: it
//! captures both streams and treats a non-zero exit as an error.
//! [`ToolCommand::run`] is the long-lived form used for the engine: it only
//! keeps a bounded tail of stderr, honours a cancellation token, kills the
//! child on timeout, and reports the exit status without judging it.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How much of the diagnostic stream [`ToolCommand::run`] retains.
pub const STDERR_TAIL_BYTES: usize = 64 * 1024;

/// How long to wait for the stderr reader after the child is gone.
/// Grandchildren can keep the pipe open past the parent's death.
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(2);

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

/// How a [`ToolCommand::run`] invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The process outlived its budget and was killed.
    TimedOut(Duration),
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// Result of a long-running tool invocation.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub outcome: RunOutcome,
    /// Last [`STDERR_TAIL_BYTES`] of standard error (lossy UTF-8).
    pub stderr: String,
    /// Wall-clock time from spawn to exit.
    pub elapsed: Duration,
}

impl ToolRun {
    /// `true` only for a clean exit with status 0.
    pub fn success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Exited(status) if status.success())
    }

    /// Exit code when the process exited on its own with one.
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            RunOutcome::Exited(status) => status.code(),
            _ => None,
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use cw_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> cw_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-print_format").arg("json")
///     .arg("-show_streams")
///     .arg("/path/to/clip.mp4")
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
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
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

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// The arguments accumulated so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Returns [`cw_core::Error::Tool`] if the process times out (message
    ///   includes the timeout duration).
    /// - Returns [`cw_core::Error::Tool`] if the process exits with a non-zero
    ///   status (message includes stderr).
    /// - Returns [`cw_core::Error::Tool`] if spawning the process fails.
    pub async fn execute(&self) -> cw_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| cw_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Dropping the future on timeout drops the child, which kills it.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(cw_core::Error::tool(
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
            Ok(Err(e)) => Err(cw_core::Error::tool(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(cw_core::Error::tool(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Run the command to completion, timeout, or cancellation.
    ///
    /// Unlike [`execute`](Self::execute), a non-zero exit is not an error:
    /// the caller inspects [`ToolRun::outcome`] and the stderr tail. Only a
    /// failure to spawn or to wait on the process is reported as `Err`.
    pub async fn run(&self, cancel: &CancellationToken) -> cw_core::Result<ToolRun> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| cw_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        tracing::debug!(tool = %program_name, pid = ?child.id(), "spawned");

        let tail = Arc::new(Mutex::new(Vec::new()));
        let reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_tail(stderr, Arc::clone(&tail))));

        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => RunOutcome::Exited(status),
                Err(e) => {
                    return Err(cw_core::Error::tool(
                        program_name,
                        format!("I/O error waiting for process: {e}"),
                    ));
                }
            },
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!(tool = %program_name, timeout = ?self.timeout, "timed out; killing");
                kill(&mut child, &program_name).await;
                RunOutcome::TimedOut(self.timeout)
            }
            _ = cancel.cancelled() => {
                tracing::info!(tool = %program_name, "cancelled; killing");
                kill(&mut child, &program_name).await;
                RunOutcome::Cancelled
            }
        };

        if let Some(handle) = reader {
            let abort = handle.abort_handle();
            if tokio::time::timeout(STDERR_DRAIN_GRACE, handle).await.is_err() {
                abort.abort();
            }
        }

        let stderr = String::from_utf8_lossy(&tail.lock()).to_string();

        Ok(ToolRun {
            outcome,
            stderr,
            elapsed: started.elapsed(),
        })
    }
}

/// Kill the child and reap it so no zombie is left behind.
async fn kill(child: &mut Child, program_name: &str) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(tool = %program_name, "failed to kill: {e}");
        return;
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(tool = %program_name, "failed to reap killed process: {e}");
    }
}

/// Read `reader` to EOF, keeping only the last [`STDERR_TAIL_BYTES`].
async fn collect_tail<R: AsyncRead + Unpin>(mut reader: R, tail: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buf = tail.lock();
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > STDERR_TAIL_BYTES {
                    let excess = buf.len() - STDERR_TAIL_BYTES;
                    buf.drain(..excess);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_echo() {
        let output = ToolCommand::new(PathBuf::from("echo"))
            .arg("hello")
            .execute()
            .await;

        match output {
            Ok(out) => {
                assert!(out.status.success());
                assert!(out.stdout.trim().contains("hello"));
            }
            Err(_) => {
                // On some minimal environments echo may not exist; skip.
            }
        }
    }

    #[tokio::test]
    async fn execute_nonexistent_tool() {
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("timed out"), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_reports_nonzero_exit_with_stderr() {
        let run = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "echo 'No space left on device' >&2; exit 3"])
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert!(!run.success());
        assert_eq!(run.exit_code(), Some(3));
        assert!(run.stderr.contains("No space left"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_success() {
        let run = ToolCommand::new(PathBuf::from("sh"))
            .args(["-c", "exit 0"])
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert!(run.success());
        assert_eq!(run.exit_code(), Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_kills_on_timeout() {
        let run = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Duration::from_millis(100))
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::TimedOut(Duration::from_millis(100)));
        assert!(!run.success());
        assert!(run.elapsed < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_kills_on_cancel() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let run = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .run(&token)
            .await
            .unwrap();
        assert_eq!(run.outcome, RunOutcome::Cancelled);
        assert_eq!(run.exit_code(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_keeps_only_tail_of_stderr() {
        // ~200 KiB of 'x' followed by a marker.
        let run = ToolCommand::new(PathBuf::from("sh"))
            .args([
                "-c",
                "head -c 204800 /dev/zero | tr '\\0' x >&2; echo END-MARKER >&2",
            ])
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert!(run.stderr.len() <= STDERR_TAIL_BYTES);
        assert!(run.stderr.trim_end().ends_with("END-MARKER"));
    }

    #[tokio::test]
    async fn run_nonexistent_tool_is_error() {
        let result = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .run(&CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
