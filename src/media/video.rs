//! Video retrieval through yt-dlp

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;
use crate::session::Platform;
use crate::staging::StagedFile;

/// Prefer a single mp4 file so Telegram can play it inline
pub const FORMAT_SELECTOR: &str = "best[ext=mp4]/best";
const OUTPUT_TEMPLATE: &str = "%(id).80B.%(ext)s";

/// Downloads one video per call into a fresh staging directory
#[derive(Debug, Clone)]
pub struct VideoFetcher {
    ytdlp_bin: String,
    staging_root: PathBuf,
}

impl VideoFetcher {
    pub fn new(ytdlp_bin: &str, staging_root: &Path) -> Self {
        Self {
            ytdlp_bin: ytdlp_bin.to_string(),
            staging_root: staging_root.to_path_buf(),
        }
    }

    /// Download `url` and return the file; the staging directory goes away
    /// with the returned value, or immediately on failure.
    ///
    /// The child process is killed if this future is dropped (e.g. on timeout).
    pub async fn fetch(&self, url: &str, platform: Platform) -> Result<StagedFile, ServiceError> {
        let dir = StagedFile::directory(&self.staging_root)?;
        let template = dir.path().join(OUTPUT_TEMPLATE);

        info!(%platform, url, "Starting yt-dlp download");

        let output = Command::new(&self.ytdlp_bin)
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("-f")
            .arg(FORMAT_SELECTOR)
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-o")
            .arg(template.to_string_lossy().to_string())
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ServiceError::Process(format!("could not run {}: {e}", self.ytdlp_bin)))?;

        if !output.status.success() {
            let message = format_ytdlp_error(&output);
            warn!(%platform, error = %message, "yt-dlp failed");
            return Err(ServiceError::Process(message));
        }

        let path = resolve_output_path(dir.path(), &String::from_utf8_lossy(&output.stdout))?;
        debug!(path = %path.display(), "yt-dlp finished");
        Ok(StagedFile::within(dir, path))
    }
}

/// Locate the file yt-dlp reported on its last non-empty stdout line
pub(crate) fn resolve_output_path(target_dir: &Path, stdout: &str) -> Result<PathBuf, ServiceError> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ServiceError::Process("yt-dlp did not return a filepath".to_string()))?;

    let mut path = PathBuf::from(line.trim());
    if path.is_relative() {
        path = target_dir.join(path);
    }
    if !path.exists() {
        return Err(ServiceError::Process(format!(
            "yt-dlp output not found: {}",
            path.display()
        )));
    }
    Ok(path)
}

pub(crate) fn format_ytdlp_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string());

    match detail {
        Some(detail) => format!("yt-dlp failed: {detail}"),
        None => format!("yt-dlp failed with {}", output.status),
    }
}
