//! Script Execution Service
//!
//! The boundary between the orchestration core and the analytics backend.
//! A step hands a script body and a JSON configuration object to a
//! [`ScriptExecutor`] and receives a [`ScriptResponse`] back.
//!
//! # Response protocol
//!
//! The script prints one JSON object to stdout. It must carry a boolean
//! `success` field; on success every other field is the step's output,
//! on failure `error` holds the message shown to the user.
//!
//! - [`process`]: subprocess-backed executor
//! - [`interpreter`]: default interpreter resolution
//! - [`builtin`]: reference analytics scripts shipped with the crate

pub mod builtin;
pub mod interpreter;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ExecutionError;
use crate::execution::CancelFlag;
use crate::workflow::ConfigMap;

pub use process::SubprocessExecutor;

/// Message used when a script reports failure without an `error` field.
pub const DEFAULT_FAILURE_MESSAGE: &str = "step reported failure";

/// Everything an executor needs to run one step's script.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    /// Name of the step, used for the script file name and logging
    pub step_name: String,
    /// Program text handed to the interpreter
    pub script: String,
    /// Configuration object delivered to the script
    pub config: Value,
    /// Run workspace; the process runs with this as its current directory
    pub workspace_dir: PathBuf,
    /// Upper bound on the script's wall-clock time
    pub timeout: Option<Duration>,
}

/// Parsed result object printed by a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResponse {
    pub success: bool,
    /// Failure message, only meaningful when `success` is false
    pub error: Option<String>,
    /// All fields of the result object except `success`
    pub payload: ConfigMap,
}

impl ScriptResponse {
    /// A failed response with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut payload = ConfigMap::new();
        payload.insert("error".to_string(), Value::String(message.clone()));
        Self {
            success: false,
            error: Some(message),
            payload,
        }
    }

    /// Interprets a decoded result object.
    pub fn from_value(value: Value) -> Result<Self, ExecutionError> {
        let Value::Object(mut payload) = value else {
            return Err(ExecutionError::MalformedOutput(
                "top-level value is not an object".to_string(),
            ));
        };

        let success = match payload.remove("success") {
            Some(Value::Bool(success)) => success,
            _ => return Err(ExecutionError::MissingSuccessField),
        };

        let error = if success {
            None
        } else {
            Some(
                payload
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or(DEFAULT_FAILURE_MESSAGE)
                    .to_string(),
            )
        };

        Ok(Self {
            success,
            error,
            payload,
        })
    }

    /// Parses a script's captured stdout.
    ///
    /// The whole trimmed output is tried first; if that is not JSON, the
    /// last non-empty line is tried, which lets scripts log progress to
    /// stdout before printing their result.
    pub fn parse(stdout: &str) -> Result<Self, ExecutionError> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Err(ExecutionError::MalformedOutput("no output".to_string()));
        }

        let value = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => value,
            Err(first_error) => {
                let last_line = trimmed.lines().rev().map(str::trim).find(|l| !l.is_empty());
                match last_line.map(|line| serde_json::from_str::<Value>(line)) {
                    Some(Ok(value)) => value,
                    _ => return Err(ExecutionError::MalformedOutput(first_error.to_string())),
                }
            }
        };

        Self::from_value(value)
    }
}

/// Runs step scripts on behalf of the dispatcher.
///
/// Implementations may run a subprocess, call an in-process library or a
/// remote service; the engine only relies on this contract. They should
/// honor `cancel` on a best-effort basis.
pub trait ScriptExecutor: Send + Sync {
    fn execute(
        &self,
        request: &ScriptRequest,
        cancel: &CancelFlag,
    ) -> Result<ScriptResponse, ExecutionError>;
}

impl<T: ScriptExecutor + ?Sized> ScriptExecutor for Arc<T> {
    fn execute(
        &self,
        request: &ScriptRequest,
        cancel: &CancelFlag,
    ) -> Result<ScriptResponse, ExecutionError> {
        (**self).execute(request, cancel)
    }
}

impl<T: ScriptExecutor + ?Sized> ScriptExecutor for Box<T> {
    fn execute(
        &self,
        request: &ScriptRequest,
        cancel: &CancelFlag,
    ) -> Result<ScriptResponse, ExecutionError> {
        (**self).execute(request, cancel)
    }
}
