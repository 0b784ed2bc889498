// Media processing through ffmpeg/ffprobe
//
// - Commands: command representation and builders for every invocation
// - Processor: ffmpeg-backed implementation running under the process runner

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::Config;
use crate::error::Result;

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Container duration in seconds
    async fn probe_duration(&self, input: &Path) -> Result<f64>;

    /// Timestamps of frames whose scene difference exceeds `threshold`
    async fn detect_scenes(&self, input: &Path, threshold: f64) -> Result<Vec<f64>>;

    /// Silence intervals below `noise_db` lasting at least `min_secs`
    async fn detect_silence(
        &self,
        input: &Path,
        noise_db: f64,
        min_secs: f64,
        duration: f64,
    ) -> Result<Vec<(f64, f64)>>;

    /// Cut `[start, start + duration)` into a standalone clip
    async fn cut_segment(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> Result<()>;

    /// Extract one still frame `at` seconds into `clip`
    async fn extract_thumbnail(&self, clip: &Path, at: f64, output: &Path) -> Result<()>;

    /// Re-encode into the canonical container
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;

    /// Check if the media tools are available
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: &Config) -> Arc<dyn MediaProcessorTrait> {
        Arc::new(processor::FfmpegProcessor::new(config))
    }
}
