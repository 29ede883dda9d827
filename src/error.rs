//! Error Types
//!
//! Every fallible layer of the engine has its own error enum:
//!
//! - [`ExecutionError`]: the analytics process could not produce a usable result
//! - [`StepError`]: why a single step failed (wraps [`ExecutionError`])
//! - [`TemplateError`]: a template is structurally invalid
//! - [`ParseError`]: a template or override file could not be loaded
//! - [`ContextError`]: an illegal write to the run context
//! - [`EngineError`]: a run could not be started at all

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of the Script Execution Service to run a script to a parsed result.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running script: {0}")]
    Io(#[from] io::Error),

    #[error("script timed out after {0:?}")]
    Timeout(Duration),

    #[error("script cancelled")]
    Cancelled,

    #[error("script exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("script output is not a JSON object: {0}")]
    MalformedOutput(String),

    #[error("script result has no boolean 'success' field")]
    MissingSuccessField,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

/// Coarse classification of a step failure, surfaced in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Execution,
    Application,
    Cancelled,
}

/// Why a single step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("unsupported step type: {0}")]
    UnsupportedStepType(String),

    #[error("missing prerequisite output: step '{step}' requires a completed {required} step")]
    MissingPrerequisite { step: String, required: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Message reported by the analytics process itself, kept verbatim.
    #[error("{0}")]
    Application(String),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedStepType(_) | Self::MissingPrerequisite { .. } => {
                ErrorKind::Configuration
            }
            Self::Execution(ExecutionError::Cancelled) => ErrorKind::Cancelled,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Application(_) => ErrorKind::Application,
        }
    }
}

/// Structural problems found while validating a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template has an empty name")]
    EmptyName,

    #[error("template '{template}' has a step with an empty name")]
    EmptyStepName { template: String },

    #[error("template '{template}' declares step '{step}' more than once")]
    DuplicateStep { template: String, step: String },

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("template '{template}' has cyclic dependencies between: {}", .steps.join(", "))]
    CyclicDependency { template: String, steps: Vec<String> },
}

/// Failure to load a template or override file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' must contain a mapping of configuration keys")]
    NotAMapping(PathBuf),

    #[error("invalid override '{0}', expected KEY=VALUE")]
    InvalidOverride(String),

    #[error(transparent)]
    Invalid(#[from] TemplateError),
}

/// Illegal mutation of a run context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("output for step '{0}' has already been recorded")]
    DuplicateOutput(String),
}

/// Problems that prevent a run from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    #[error("failed to create workspace under '{root}': {source}")]
    Workspace {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
}
