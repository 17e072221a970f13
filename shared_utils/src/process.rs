//! External tool process management
//!
//! `cjpegli` and `exiftool` are run as child processes. Both stdout and stderr
//! are piped, and each pipe is drained by its own thread: a child that fills a
//! 64KB pipe buffer nobody reads would otherwise block forever, and the
//! timeout below would be the only way out.
//!
//! ```ignore
//! use shared_utils::process::ToolProcess;
//! use std::time::Duration;
//!
//! let output = ToolProcess::run("cjpegli", &args, Duration::from_secs(300))?;
//! if !output.success() {
//!     eprintln!("{}", output.error_summary());
//! }
//! ```

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::logging::log_external_tool;

/// Polling interval while waiting for a child with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },

    #[error("I/O error while waiting for {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished tool.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The most useful line of stderr for a one-line error message.
    pub fn error_summary(&self) -> String {
        summarize_stderr(&self.stderr, self.status.code())
    }
}

/// A spawned tool whose output pipes are drained in the background.
pub struct ToolProcess {
    tool: String,
    args: Vec<String>,
    child: Child,
    stdout_thread: Option<JoinHandle<String>>,
    stderr_thread: Option<JoinHandle<String>>,
    started: Instant,
}

impl ToolProcess {
    /// Spawn `program` with `args`. Stdin is closed.
    pub fn spawn<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<Self, ToolError> {
        let tool = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        let arg_strings: Vec<String> = args
            .iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();

        debug!(tool = %tool, args = ?arg_strings, "Spawning external tool");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let stdout_thread = child.stdout.take().map(drain);
        let stderr_thread = child.stderr.take().map(drain);

        Ok(Self {
            tool,
            args: arg_strings,
            child,
            stdout_thread,
            stderr_thread,
            started: Instant::now(),
        })
    }

    /// Spawn and wait in one call.
    pub fn run<S: AsRef<OsStr>>(
        program: &Path,
        args: &[S],
        timeout: Duration,
    ) -> Result<ToolOutput, ToolError> {
        Self::spawn(program, args)?.wait_with_timeout(timeout)
    }

    /// Wait for the child; kill it once `timeout` has elapsed.
    pub fn wait_with_timeout(mut self, timeout: Duration) -> Result<ToolOutput, ToolError> {
        let deadline = self.started + timeout;

        let status = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(tool = %self.tool, ?timeout, "External tool timed out, killing");
                    // kill() fails only if the child already exited; wait() reaps it either way.
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    self.join_output();
                    return Err(ToolError::TimedOut {
                        tool: self.tool,
                        timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = self.child.kill();
                    return Err(ToolError::Io {
                        tool: self.tool,
                        source,
                    });
                }
            }
        };

        let duration = self.started.elapsed();
        let (stdout, stderr) = self.join_output();

        let combined = if !stdout.is_empty() && !stderr.is_empty() {
            format!("STDOUT:\n{}\n\nSTDERR:\n{}", stdout, stderr)
        } else if !stdout.is_empty() {
            stdout.clone()
        } else {
            stderr.clone()
        };
        log_external_tool(&self.tool, &self.args, &combined, status.code(), duration);

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    fn join_output(&mut self) -> (String, String) {
        let stdout = self
            .stdout_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        (stdout, stderr)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Pick the line that explains a failure: the last line mentioning an error,
/// else the last non-empty line.
pub fn summarize_stderr(stderr: &str, exit_code: Option<i32>) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let line = lines
        .iter()
        .rev()
        .find(|l| l.to_lowercase().contains("error"))
        .or_else(|| lines.last());

    match (line, exit_code) {
        (Some(line), _) => line.to_string(),
        (None, Some(code)) => format!("exited with code {}", code),
        (None, None) => "terminated by signal".to_string(),
    }
}
