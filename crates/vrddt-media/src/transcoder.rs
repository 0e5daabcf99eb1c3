//! Transcoder contract and its FFmpeg implementation.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Merges a video stream and an optional audio stream into one MP4.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, video: &Path, audio: Option<&Path>, output: &Path) -> MediaResult<()>;
}

/// [`Transcoder`] that shells out to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, video: &Path, audio: Option<&Path>, output: &Path) -> MediaResult<()> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }

        let cmd = FfmpegCommand::new(video, output)
            .maybe_audio(audio)
            .log_level("error");
        self.runner.run(&cmd).await?;

        if !output.exists() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg reported success but produced no output",
                None,
                Some(0),
            ));
        }

        info!(
            output = %output.display(),
            with_audio = audio.is_some(),
            "Transcoded video"
        );
        Ok(())
    }
}
