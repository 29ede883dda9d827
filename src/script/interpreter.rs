//! Analytics Interpreter Resolution
//!
//! The reference analytics scripts are Python programs. The interpreter
//! binary is resolved once per process in the following order:
//!
//! 1. `QUANTFLOW_PYTHON` environment variable
//! 2. `python3` on the system PATH
//! 3. `python` on the system PATH
//! 4. The bare name `python3`, left for the OS to resolve at spawn time

use std::env;
use std::path::PathBuf;
use std::process::Command;

use log::{info, warn};
use once_cell::sync::Lazy;

/// Environment variable that pins the interpreter path.
pub const INTERPRETER_ENV: &str = "QUANTFLOW_PYTHON";

/// Lazily-resolved default interpreter.
pub static DEFAULT_INTERPRETER: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = env::var_os(INTERPRETER_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(path);
        info!("Using interpreter from {}: {}", INTERPRETER_ENV, path.display());
        return path;
    }

    for candidate in ["python3", "python"] {
        if let Some(path) = which(candidate) {
            info!("Using system interpreter: {}", path.display());
            return path;
        }
    }

    warn!("No Python interpreter found on PATH");
    warn!("  Set {} to the interpreter that runs analytics scripts", INTERPRETER_ENV);
    PathBuf::from("python3")
});

/// Looks a binary up on the system PATH.
pub fn which(binary: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(binary).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
