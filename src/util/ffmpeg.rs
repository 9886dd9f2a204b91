//! Encoder binary discovery and probing.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};

/// Locate ffmpeg in PATH and verify it answers `-version`.
pub fn discover_ffmpeg() -> Result<PathBuf> {
    let path = which::which("ffmpeg").context("ffmpeg not found in PATH")?;
    let output = Command::new(&path)
        .arg("-version")
        .output()
        .with_context(|| format!("failed to run {} -version", path.display()))?;
    if !output.status.success() {
        return Err(anyhow!("ffmpeg -version exited with {}", output.status));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("").to_string();
    info!("using encoder: {} ({})", path.display(), first_line);
    Ok(path)
}

/// Measured container duration of a media file, in seconds, via ffprobe.
///
/// Best-effort: the pipeline only uses this to log when the encoded
/// length diverges from the scene-sum figure it reports.
pub fn probe_duration(path: &Path) -> Result<f64> {
    let ffprobe = which::which("ffprobe").context("ffprobe not found in PATH")?;
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .context("failed to run ffprobe")?;
    if !output.status.success() {
        return Err(anyhow!("ffprobe exited with {}", output.status));
    }
    let raw = String::from_utf8_lossy(&output.stdout);
    let duration = raw
        .trim()
        .parse::<f64>()
        .with_context(|| format!("unparseable ffprobe duration: {raw:?}"))?;
    debug!("probed duration of {}: {:.2}s", path.display(), duration);
    Ok(duration)
}
