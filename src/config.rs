//! Engine Configuration
//!
//! Settings shared by every run an [`Engine`](crate::Engine) executes.
//! Values come from [`EngineConfig::default`], the environment, and CLI
//! flags applied on top.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::script::interpreter::{DEFAULT_INTERPRETER, INTERPRETER_ENV};

pub const WORKSPACE_ROOT_ENV: &str = "QUANTFLOW_WORKSPACE_ROOT";
pub const STEP_TIMEOUT_ENV: &str = "QUANTFLOW_STEP_TIMEOUT_SECS";
pub const TOLERATE_OPTIONAL_ENV: &str = "QUANTFLOW_TOLERATE_OPTIONAL_FAILURES";

/// Default upper bound on a single step's wall-clock time.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Interpreter that runs the analytics scripts
    pub interpreter: PathBuf,
    /// Parent directory of run workspaces
    pub workspace_root: PathBuf,
    /// Timeout for steps that do not set their own; `None` disables it
    pub step_timeout: Option<Duration>,
    /// Continue past failed steps marked `required: false`
    pub tolerate_optional_failures: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.clone(),
            workspace_root: env::temp_dir(),
            step_timeout: Some(DEFAULT_STEP_TIMEOUT),
            tolerate_optional_failures: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the `QUANTFLOW_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(INTERPRETER_ENV).filter(|v| !v.is_empty()) {
            config.interpreter = PathBuf::from(path);
        }

        if let Some(root) = lookup(WORKSPACE_ROOT_ENV).filter(|v| !v.is_empty()) {
            config.workspace_root = PathBuf::from(root);
        }

        if let Some(raw) = lookup(STEP_TIMEOUT_ENV) {
            match parse_timeout(&raw) {
                Some(timeout) => config.step_timeout = timeout,
                None => warn!("Ignoring {}={}: expected seconds", STEP_TIMEOUT_ENV, raw),
            }
        }

        if let Some(raw) = lookup(TOLERATE_OPTIONAL_ENV) {
            match parse_flag(&raw) {
                Some(flag) => config.tolerate_optional_failures = flag,
                None => warn!("Ignoring {}={}: expected true or false", TOLERATE_OPTIONAL_ENV, raw),
            }
        }

        config
    }
}

/// Parses a timeout in seconds. `0` disables the timeout.
///
/// Negative values and values too large for a [`Duration`] are rejected.
pub fn parse_timeout(raw: &str) -> Option<Option<Duration>> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs == 0.0 {
        return Some(None);
    }
    Duration::try_from_secs_f64(secs).ok().map(Some)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
