//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consecutive failed items before the loop gives up
    pub max_errors: u32,
    /// Pause between loop iterations, whatever the outcome
    pub sleep: Duration,
    /// Parent directory for per-item scratch directories
    pub work_dir: PathBuf,
    /// Explicit ffmpeg binary; `PATH` lookup when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// Kill ffmpeg after this long
    pub transcode_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_errors: 10,
            sleep: Duration::from_millis(1000),
            work_dir: std::env::temp_dir().join("vrddt"),
            ffmpeg_path: None,
            transcode_timeout: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_errors: std::env::var("WORKER_MAX_ERRORS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_errors),
            sleep: std::env::var("WORKER_SLEEP_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sleep),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            transcode_timeout: std::env::var("WORKER_TRANSCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_errors, 10);
        assert_eq!(config.sleep, Duration::from_secs(1));
        assert!(config.ffmpeg_path.is_none());
    }
}
