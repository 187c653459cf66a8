//! # Staging Module
//!
//! Uniquely named temporary files whose lifetime is tied to a Rust value.
//! A [`StagedFile`] removes its file (or the directory it lives in) when it
//! is dropped, on every exit path of the code that owns it. Cleanup failures
//! are logged and never propagated.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

const STAGING_PREFIX: &str = "superbot-";

/// A temporary file removed when the value is dropped
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    /// Set when the file lives in a directory created for it alone
    dir: Option<TempDir>,
}

impl StagedFile {
    /// Write `bytes` to a fresh uniquely named file under `root`
    pub fn write(root: &Path, bytes: &[u8], suffix: &str) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(suffix)
            .tempfile_in(root)?;
        file.as_file_mut().write_all(bytes)?;
        file.as_file_mut().flush()?;
        let path = file.into_temp_path().keep()?;
        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(Self { path, dir: None })
    }

    /// Take ownership of a file produced inside a staging directory.
    ///
    /// The whole directory is removed on drop.
    pub fn within(dir: TempDir, path: PathBuf) -> Self {
        Self {
            path,
            dir: Some(dir),
        }
    }

    /// Create an empty, uniquely named directory under `root`
    pub fn directory(root: &Path) -> io::Result<TempDir> {
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the staged file in bytes
    pub fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// File name to present when the artifact is sent or published
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed staging directory {}", dir_path.display()),
                Err(e) => warn!(
                    "Failed to remove staging directory {}: {}",
                    dir_path.display(),
                    e
                ),
            }
            return;
        }

        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Staged file {} was already gone", self.path.display())
            }
            Err(e) => warn!(
                "Failed to remove staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
