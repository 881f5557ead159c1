//! Still-frame capture for video inputs.
//!
//! [`FrameExtractor`] abstracts "give me one representative image of this
//! video". The native implementation shells out to `ffmpeg` and reads a
//! single JPEG frame from its stdout. Capture is time-boxed: if the first
//! full-resolution attempt does not finish within the configured bound, a
//! second, downscaled capture is attempted under the same bound.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::FrameConfig;
use crate::error::{Result, RuneError};
use crate::media::{data_url, InputFile};

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillFrame {
    pub mime: String,
    pub bytes: Vec<u8>,
    /// True when the frame came from the low-resolution fallback capture.
    pub downscaled: bool,
}

impl StillFrame {
    pub fn to_data_url(&self) -> String {
        data_url(&self.mime, &self.bytes)
    }
}

/// Platform capability that turns a video file into a still frame.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Short identifier for logs (e.g. `"ffmpeg"`).
    fn name(&self) -> &str;

    async fn extract_frame(&self, video: &InputFile) -> Result<StillFrame>;
}

/// Frame extractor used when no decoder is configured. Always fails.
pub struct DisabledFrameExtractor;

#[async_trait]
impl FrameExtractor for DisabledFrameExtractor {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract_frame(&self, _video: &InputFile) -> Result<StillFrame> {
        Err(RuneError::Unavailable(
            "frame extraction is disabled".to_string(),
        ))
    }
}

/// Frame extractor backed by the `ffmpeg` command-line tool.
pub struct FfmpegFrameExtractor {
    ffmpeg: PathBuf,
    offset_secs: f64,
    timeout: Duration,
    fallback_width: u32,
    fallback_height: u32,
}

impl FfmpegFrameExtractor {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            offset_secs: config.offset_secs,
            timeout: Duration::from_millis(config.timeout_ms),
            fallback_width: config.fallback_width,
            fallback_height: config.fallback_height,
        }
    }

    /// Arguments for one capture. `scale` requests the downscaled fallback.
    fn capture_args(&self, input: &Path, scale: Option<(u32, u32)>) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", self.offset_secs),
            "-i".to_string(),
            input.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
        ];
        match scale {
            Some((w, h)) => {
                args.push("-vf".to_string());
                args.push(format!("scale={}:{}", w, h));
                args.push("-q:v".to_string());
                args.push("6".to_string());
            }
            None => {
                args.push("-q:v".to_string());
                args.push("3".to_string());
            }
        }
        args.extend(
            ["-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }

    async fn capture(&self, input: &Path, scale: Option<(u32, u32)>) -> Result<Vec<u8>> {
        let args = self.capture_args(input, scale);
        debug!(ffmpeg = %self.ffmpeg.display(), ?args, "capturing video frame");

        let child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RuneError::Unavailable(format!(
                    "failed to start {}: {}",
                    self.ffmpeg.display(),
                    e
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                RuneError::Transport(format!(
                    "frame capture timed out after {} ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| RuneError::Transport(format!("frame capture failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuneError::Parse(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(RuneError::Parse("ffmpeg produced no frame".to_string()));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn extract_frame(&self, video: &InputFile) -> Result<StillFrame> {
        // ffmpeg needs a seekable file; spool in-memory inputs to disk.
        let spooled;
        let input: &Path = match &video.path {
            Some(path) => path,
            None => {
                spooled = tempfile::Builder::new()
                    .prefix("rune-frame-")
                    .suffix(&video.extension())
                    .tempfile()
                    .map_err(|e| RuneError::Input(format!("cannot spool video: {}", e)))?;
                tokio::fs::write(spooled.path(), &video.bytes)
                    .await
                    .map_err(|e| RuneError::Input(format!("cannot spool video: {}", e)))?;
                spooled.path()
            }
        };

        match self.capture(input, None).await {
            Ok(bytes) => Ok(StillFrame {
                mime: "image/jpeg".to_string(),
                bytes,
                downscaled: false,
            }),
            Err(RuneError::Unavailable(msg)) => Err(RuneError::Unavailable(msg)),
            Err(first) => {
                warn!(
                    file = %video.name,
                    error = %first,
                    "full-resolution frame capture failed, retrying downscaled"
                );
                let bytes = self
                    .capture(input, Some((self.fallback_width, self.fallback_height)))
                    .await?;
                Ok(StillFrame {
                    mime: "image/jpeg".to_string(),
                    bytes,
                    downscaled: true,
                })
            }
        }
    }
}

/// Create the [`FrameExtractor`] selected by configuration.
pub fn create_frame_extractor(config: &FrameConfig) -> Box<dyn FrameExtractor> {
    match config.extractor.as_str() {
        "ffmpeg" => Box::new(FfmpegFrameExtractor::new(config)),
        _ => Box::new(DisabledFrameExtractor),
    }
}
