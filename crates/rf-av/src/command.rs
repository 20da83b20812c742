//! Builder for running external tools with a timeout.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

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

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use rf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> rf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-of", "json", "-show_format"])
///     .arg("/data/video/abc123.mp4")
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

    /// The arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`rf_core::Error::Tool`] when the process cannot be spawned,
    /// times out (the child is killed), or exits non-zero. In the last case
    /// the message carries the tool's stderr verbatim, falling back to stdout
    /// when stderr is empty.
    pub async fn execute(&self) -> rf_core::Result<ToolOutput> {
        let tool = self.tool_name();
        tracing::debug!(tool = %tool, args = ?self.args, "Running external tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| rf_core::Error::tool(&tool, format!("failed to spawn: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(rf_core::Error::tool(
                    tool,
                    format!("I/O error waiting for process: {e}"),
                ))
            }
            // Dropping the future drops the child, which kills it.
            Err(_elapsed) => {
                return Err(rf_core::Error::tool(
                    tool,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };

        let captured = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !captured.status.success() {
            let diagnostics = if captured.stderr.trim().is_empty() {
                captured.stdout.trim()
            } else {
                captured.stderr.trim()
            };
            return Err(rf_core::Error::tool(
                tool,
                format!("exited with {}: {diagnostics}", captured.status),
            ));
        }

        Ok(captured)
    }
}
