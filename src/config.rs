use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CutterError, Result};

/// Pinned downloader release fetched into the storage `bin/` cache.
pub const DOWNLOADER_RELEASE_URL: &str =
    "https://github.com/yt-dlp/yt-dlp/releases/download/2024.08.06/yt-dlp";

fn default_queue_name() -> String {
    "ingest".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub timeouts: TimeoutConfig,
    pub acquisition: AcquisitionConfig,
    pub highlight: HighlightConfig,
    pub segment: SegmentConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding downloads/, clips/, bin/, db/ and log/
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg binary
    pub ffmpeg: String,
    /// Path to ffprobe binary
    pub ffprobe: String,
    /// Explicit downloader binary; when unset it is located on PATH or in the bin cache
    pub downloader: Option<String>,
    /// Release artifact downloaded into the bin cache when no downloader is found
    pub downloader_release_url: String,
    /// Python interpreter used for the yt_dlp module fallback
    pub python: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Idle timeout for downloader invocations (seconds)
    pub download_idle_secs: u64,
    /// Idle timeout for other streamed I/O: ffmpeg runs, HTTP bodies (seconds)
    pub stream_idle_secs: u64,
    /// Connect timeout for HTTP fetches (seconds)
    pub connect_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Downloads smaller than this are treated as failed
    pub min_download_bytes: u64,
    /// Container every acquired file is normalized to
    pub canonical_container: String,
    /// Fragment concurrency passed to the downloader
    pub concurrent_fragments: u32,
    /// Retry count passed to the downloader for requests and fragments
    pub retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Run scene/silence analysis before segmentation
    pub enabled: bool,
    /// Maximum number of highlight windows per job
    pub max_clips: usize,
    /// Per-frame scene difference threshold (0.0 - 1.0)
    pub scene_threshold: f64,
    /// Silence floor in dB
    pub silence_noise_db: f64,
    /// Minimum silence duration in seconds
    pub silence_min_secs: f64,
    /// Weight of each scene cut relative to one second of audio activity
    pub scene_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// x264 preset for clip encoding
    pub preset: String,
    /// x264 constant rate factor
    pub crf: u8,
    /// AAC bitrate
    pub audio_bitrate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Redis URL; when unset jobs run in-process
    pub redis_url: Option<String>,
    /// Redis list used as the ingest queue
    #[serde(default = "default_queue_name")]
    pub name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                root: PathBuf::from("storage"),
            },
            tools: ToolsConfig {
                ffmpeg: "ffmpeg".to_string(),
                ffprobe: "ffprobe".to_string(),
                downloader: None,
                downloader_release_url: DOWNLOADER_RELEASE_URL.to_string(),
                python: "python3".to_string(),
            },
            timeouts: TimeoutConfig {
                download_idle_secs: 15 * 60,
                stream_idle_secs: 3 * 60,
                connect_secs: 30,
            },
            acquisition: AcquisitionConfig {
                min_download_bytes: 64 * 1024,
                canonical_container: "mp4".to_string(),
                concurrent_fragments: 4,
                retries: 10,
            },
            highlight: HighlightConfig {
                enabled: true,
                max_clips: 5,
                scene_threshold: 0.35,
                silence_noise_db: -30.0,
                silence_min_secs: 0.5,
                scene_weight: 0.75,
            },
            segment: SegmentConfig {
                preset: "veryfast".to_string(),
                crf: 23,
                audio_bitrate: "128k".to_string(),
            },
            queue: QueueConfig {
                redis_url: None,
                name: default_queue_name(),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CutterError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| CutterError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CutterError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CutterError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (environment, tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty("STORAGE_DIR") {
            self.storage.root = PathBuf::from(dir);
        }
        if let Some(path) = non_empty("FFMPEG_PATH") {
            self.tools.ffmpeg = path;
        }
        if let Some(path) = non_empty("FFPROBE_PATH") {
            self.tools.ffprobe = path;
        }
        if let Some(path) = non_empty("YTDLP_PATH") {
            self.tools.downloader = Some(path);
        }
        if let Some(url) = non_empty("REDIS_URL") {
            self.queue.redis_url = Some(url);
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.storage.root.join("downloads")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.storage.root.join("clips")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.storage.root.join("bin")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.storage.root.join("db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage.root.join("log")
    }

    pub fn download_idle(&self) -> Duration {
        Duration::from_secs(self.timeouts.download_idle_secs)
    }

    pub fn stream_idle(&self) -> Duration {
        Duration::from_secs(self.timeouts.stream_idle_secs)
    }
}
