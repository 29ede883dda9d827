//! Run Workspaces
//!
//! Each run gets a fresh directory under the configured workspace root.
//! The directory is removed when the [`Workspace`] is closed or dropped,
//! which covers early returns and unwinding panics alike.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};
use tempfile::TempDir;

/// Prefix of every workspace directory name.
const WORKSPACE_PREFIX: &str = "quantflow-";

/// An exclusively-owned, self-removing run directory.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    run_id: String,
}

impl Workspace {
    /// Creates a unique workspace directory under `root`, creating `root`
    /// itself if needed.
    ///
    /// The run id is the directory name without its prefix: a UTC
    /// timestamp followed by a random suffix.
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}-", WORKSPACE_PREFIX, stamp))
            .tempdir_in(root)?;

        let run_id = dir
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(WORKSPACE_PREFIX))
            .unwrap_or_default()
            .to_string();

        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir, run_id })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Removes the directory now, logging instead of failing if that is
    /// not possible.
    pub fn close(self) {
        let path: PathBuf = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed workspace {}", path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}
