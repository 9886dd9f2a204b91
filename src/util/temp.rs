//! Per-job scratch space.
//!
//! Every render job owns one temp directory. Intermediate files (frame
//! stills, the voiceover, the caption track, the concat listing, the
//! local encode output) are registered here and removed on both success
//! and failure; dropping the manager removes the directory itself.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use tempfile::TempDir;

use crate::error::Result;

pub struct TempFileManager {
    temp_dir: TempDir,
    files: Vec<PathBuf>,
}

impl TempFileManager {
    /// Create a scratch directory under the system temp dir.
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
            files: Vec::new(),
        })
    }

    /// Create a scratch directory under `parent`.
    pub fn new_in(parent: &Path) -> Result<Self> {
        fs::create_dir_all(parent)?;
        Ok(Self {
            temp_dir: tempfile::tempdir_in(parent)?,
            files: Vec::new(),
        })
    }

    /// Register a new file path inside the scratch directory. The file
    /// is not created; callers write it themselves.
    pub fn path_for(&mut self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        self.files.push(path.clone());
        path
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Remove every registered file. Missing files are fine; removal
    /// errors are logged and never mask the caller's own error.
    pub fn cleanup(&mut self) {
        for file in self.files.drain(..) {
            if file.exists() {
                if let Err(e) = fs::remove_file(&file) {
                    warn!("failed to remove temp file {}: {}", file.display(), e);
                }
            }
        }
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
