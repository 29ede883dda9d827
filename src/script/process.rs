//! Subprocess Script Execution
//!
//! Runs a step script in its own interpreter process:
//! - The script body is written to `<workspace>/.scripts/<step>.<ext>`
//! - The configuration object is written to the process's stdin as JSON
//! - stdout/stderr are captured on reader threads
//! - The process is polled until it exits, times out or is cancelled

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use super::interpreter::DEFAULT_INTERPRETER;
use super::{ScriptExecutor, ScriptRequest, ScriptResponse};
use crate::error::ExecutionError;
use crate::execution::CancelFlag;

/// Interval between exit/timeout/cancellation checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Directory inside the workspace holding generated scripts.
const SCRIPT_DIR: &str = ".scripts";

/// Maximum stderr characters carried into an error message.
const STDERR_EXCERPT_CHARS: usize = 2000;

/// Script executor that spawns one interpreter process per step.
///
/// # Example
///
/// ```rust,no_run
/// use quantflow::script::SubprocessExecutor;
///
/// let executor = SubprocessExecutor::new("/usr/bin/python3");
/// let shell = SubprocessExecutor::new("sh").with_extension("sh");
/// ```
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    interpreter: PathBuf,
    extension: String,
}

impl SubprocessExecutor {
    /// Creates an executor running scripts with `interpreter`.
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            extension: "py".to_string(),
        }
    }

    /// Sets the file extension used for generated scripts.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn write_script(&self, request: &ScriptRequest) -> Result<PathBuf, ExecutionError> {
        let script_dir = request.workspace_dir.join(SCRIPT_DIR);
        fs::create_dir_all(&script_dir)?;

        let file_name = format!("{}.{}", sanitize(&request.step_name), self.extension);
        let script_path = script_dir.join(file_name);
        let mut file = File::create(&script_path)?;
        file.write_all(request.script.as_bytes())?;

        debug!("Wrote script for '{}' to {}", request.step_name, script_path.display());
        Ok(script_path)
    }

    fn spawn(&self, script_path: &Path, workspace_dir: &Path) -> Result<Child, ExecutionError> {
        Command::new(&self.interpreter)
            .arg(script_path)
            .current_dir(workspace_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                interpreter: self.interpreter.display().to_string(),
                source,
            })
    }
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER.clone())
    }
}

impl ScriptExecutor for SubprocessExecutor {
    fn execute(
        &self,
        request: &ScriptRequest,
        cancel: &CancelFlag,
    ) -> Result<ScriptResponse, ExecutionError> {
        let payload = serde_json::to_vec(&request.config)
            .map_err(|e| ExecutionError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        let script_path = self.write_script(request)?;
        let mut child = match self.spawn(&script_path, &request.workspace_dir) {
            Ok(child) => child,
            Err(e) => {
                remove_script(&script_path);
                return Err(e);
            }
        };

        debug!(
            "Started '{}' (pid {}) with {}",
            request.step_name,
            child.id(),
            self.interpreter.display()
        );

        // Written on its own thread so a script that never reads stdin
        // cannot block us on a full pipe.
        let stdin_writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&payload) {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        warn!("Failed to write script configuration: {}", e);
                    }
                }
            })
        });
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let status = wait_with_deadline(&mut child, request.timeout, cancel);
        remove_script(&script_path);

        // A killed script may leave grandchildren holding the pipes open,
        // so the I/O threads are only joined after a normal exit.
        let status = status?;

        if let Some(handle) = stdin_writer {
            let _ = handle.join();
        }
        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        if !stderr.trim().is_empty() {
            debug!("Step '{}' stderr:\n{}", request.step_name, stderr);
        }

        if !status.success() {
            error!(
                "Step '{}' script failed with exit code: {:?}",
                request.step_name,
                status.code()
            );
            return Err(ExecutionError::NonZeroExit {
                code: status.code(),
                stderr: excerpt(&stderr),
            });
        }

        ScriptResponse::parse(&stdout)
    }
}

/// Polls the child until it exits, the deadline passes or `cancel` is set.
///
/// The child is killed and reaped on timeout or cancellation.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
    cancel: &CancelFlag,
) -> Result<ExitStatus, ExecutionError> {
    let started = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                warn!("Script exceeded its {:?} limit, killing pid {}", limit, child.id());
                kill(child);
                return Err(ExecutionError::Timeout(limit));
            }
        }

        if cancel.is_cancelled() {
            warn!("Cancellation requested, killing pid {}", child.id());
            kill(child);
            return Err(ExecutionError::Cancelled);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn remove_script(script_path: &Path) {
    if let Err(e) = fs::remove_file(script_path) {
        warn!("Failed to clean up script {}: {}", script_path.display(), e);
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill pid {}: {}", child.id(), e);
    }
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = source.read_to_end(&mut buf) {
            warn!("Failed to read script output: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Keeps the tail of stderr, where interpreters put the actual error.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect();
    format!("...{}", tail)
}

/// Makes a step name safe to use as a file name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "step".to_string()
    } else {
        cleaned
    }
}
