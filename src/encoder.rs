//! External encoder invocation.
//!
//! The encoder is an external ffmpeg process driven by a declarative
//! argument list. It is treated as a cancellable, monitorable child: on
//! cancellation or timeout the subprocess is killed and the failure is
//! reported with the captured stderr tail, so no orphaned process or
//! half-written output survives the job.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EncodeError;
use crate::util::ffmpeg::discover_ffmpeg;

const STDERR_TAIL_LINES: usize = 40;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

/// One fully assembled encoder invocation.
#[derive(Debug, Clone)]
pub struct EncodeInvocation {
    /// Complete argument list, output path last.
    pub args: Vec<String>,
    /// Where the encoder writes the finished file.
    pub output: PathBuf,
    /// Target duration of the image sequence, used to turn the encoder's
    /// `time=` reports into a progress fraction.
    pub expected_duration_seconds: f64,
}

/// The seam between the render graph and the real subprocess.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn run(
        &self,
        invocation: &EncodeInvocation,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<f32>>,
    ) -> Result<(), EncodeError>;
}

/// Drives a real ffmpeg child process.
pub struct FfmpegEncoder {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Locate ffmpeg in PATH.
    pub fn discover(timeout: Duration) -> Result<Self, EncodeError> {
        let binary = discover_ffmpeg()
            .map_err(|e| EncodeError::Precondition(e.to_string()))?;
        Ok(Self::new(binary, timeout))
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(
        &self,
        invocation: &EncodeInvocation,
        cancel: &CancellationToken,
        progress: Option<mpsc::Sender<f32>>,
    ) -> Result<(), EncodeError> {
        info!(
            "starting encoder: {} {}",
            self.binary.display(),
            invocation.args.join(" ")
        );

        let mut child = Command::new(&self.binary)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncodeError::Spawn)?;

        let stderr = child.stderr.take();
        let expected = invocation.expected_duration_seconds;
        let reader = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let Some(stderr) = stderr else {
                return tail;
            };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let (Some(tx), Some(seconds)) = (&progress, parse_encoded_seconds(&line)) {
                    if expected > 0.0 {
                        let _ = tx.try_send((seconds / expected).clamp(0.0, 1.0) as f32);
                    }
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                warn!("encode cancelled, killing encoder process");
                let _ = child.kill().await;
                let _ = reader.await;
                return Err(EncodeError::Cancelled);
            }
            _ = tokio::time::sleep(self.timeout) => {
                error!("encoder exceeded {}s timeout, killing it", self.timeout.as_secs());
                let _ = child.kill().await;
                let _ = reader.await;
                return Err(EncodeError::Timeout { seconds: self.timeout.as_secs() });
            }
        };

        let tail = reader.await.unwrap_or_default();
        if !status.success() {
            let stderr_tail = tail.into_iter().collect::<Vec<_>>().join("\n");
            error!("encoder failed: {}", stderr_tail);
            return Err(EncodeError::ExitStatus {
                status: status.to_string(),
                stderr_tail,
            });
        }

        info!("encoder finished: {}", invocation.output.display());
        Ok(())
    }
}

/// Extract the encoded position in seconds from an ffmpeg stats line.
fn parse_encoded_seconds(line: &str) -> Option<f64> {
    let caps = TIME_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoded_seconds() {
        let line = "frame=  901 fps=123 q=28.0 size=1024KiB time=00:00:30.04 bitrate= 279kbits/s speed=4.1x";
        assert_eq!(parse_encoded_seconds(line), Some(30.04));
        assert_eq!(
            parse_encoded_seconds("time=01:02:03.50 bitrate=..."),
            Some(3723.5)
        );
        assert_eq!(parse_encoded_seconds("no progress here"), None);
    }
}
