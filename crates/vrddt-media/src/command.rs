//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Lines of stderr kept on failure.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for an FFmpeg mux: one video input, an optional audio input, one
/// MP4 output. The video stream is copied, audio is re-encoded to AAC.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    video: PathBuf,
    audio: Option<PathBuf>,
    output: PathBuf,
    /// Whether to overwrite output
    overwrite: bool,
    log_level: Option<String>,
}

impl FfmpegCommand {
    pub fn new(video: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            video: video.as_ref().to_path_buf(),
            audio: None,
            output: output.as_ref().to_path_buf(),
            overwrite: true,
            log_level: None,
        }
    }

    /// Add a separately fetched audio track.
    pub fn audio(mut self, audio: impl AsRef<Path>) -> Self {
        self.audio = Some(audio.as_ref().to_path_buf());
        self
    }

    pub fn maybe_audio(self, audio: Option<&Path>) -> Self {
        match audio {
            Some(path) => self.audio(path),
            None => self,
        }
    }

    /// Set FFmpeg's `-v` level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        if let Some(level) = &self.log_level {
            args.push("-v".to_string());
            args.push(level.clone());
        }

        args.push("-i".to_string());
        args.push(self.video.to_string_lossy().to_string());

        if let Some(audio) = &self.audio {
            args.push("-i".to_string());
            args.push(audio.to_string_lossy().to_string());
            args.push("-c:a".to_string());
            args.push("aac".to_string());
        }

        args.extend(
            ["-c:v", "copy", "-strict", "experimental", "-f", "mp4"]
                .iter()
                .map(|s| s.to_string()),
        );

        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runs FFmpeg commands with an optional timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            timeout_secs: None,
        }
    }

    /// Resolve `ffmpeg` from an explicit path or from `PATH`.
    pub fn locate(explicit: Option<&Path>) -> MediaResult<Self> {
        let binary = match explicit {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(path) => return Err(MediaError::FfmpegNotFound(path.display().to_string())),
            None => which::which("ffmpeg")
                .map_err(|e| MediaError::FfmpegNotFound(format!("ffmpeg in PATH: {}", e)))?,
        };
        Ok(Self::new(binary))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds, killing process", secs);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(secs));
                }
            },
            None => child.wait().await?,
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if status.success() {
            return Ok(());
        }

        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(tail(&stderr, STDERR_TAIL_LINES)),
            status.code(),
        ))
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
