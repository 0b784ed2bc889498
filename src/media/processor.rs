use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{MediaCommandBuilder, MediaProcessorTrait};
use crate::config::{Config, SegmentConfig};
use crate::error::{CutterError, Result};
use crate::parse;
use crate::process::ProcessRunner;

/// Concrete implementation of media processor (FFmpeg-based)
pub struct FfmpegProcessor {
    command_builder: MediaCommandBuilder,
    runner: ProcessRunner,
    segment: SegmentConfig,
    idle_timeout: Duration,
}

impl FfmpegProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(&config.tools.ffmpeg, &config.tools.ffprobe),
            runner: ProcessRunner::default(),
            segment: config.segment.clone(),
            idle_timeout: config.stream_idle(),
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for FfmpegProcessor {
    async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let command = self.command_builder.probe_duration(input);
        let output = self
            .runner
            .run(&command, self.idle_timeout)
            .await
            .map_err(|e| {
                if matches!(e, CutterError::ToolMissing(_)) {
                    e
                } else {
                    CutterError::ProbeFailure(format!("{}: {}", input.display(), e))
                }
            })?;

        parse::parse_duration(&output.stdout).ok_or_else(|| {
            CutterError::ProbeFailure(format!(
                "{}: no duration in ffprobe output {:?}",
                input.display(),
                output.stdout.trim()
            ))
        })
    }

    async fn detect_scenes(&self, input: &Path, threshold: f64) -> Result<Vec<f64>> {
        let command = self.command_builder.scene_detection(input, threshold);
        let output = self.runner.run(&command, self.idle_timeout).await?;
        let times = parse::parse_scene_times(&output.stderr);
        debug!("Detected {} scene cuts in {}", times.len(), input.display());
        Ok(times)
    }

    async fn detect_silence(
        &self,
        input: &Path,
        noise_db: f64,
        min_secs: f64,
        duration: f64,
    ) -> Result<Vec<(f64, f64)>> {
        let command = self
            .command_builder
            .silence_detection(input, noise_db, min_secs);
        let output = self.runner.run(&command, self.idle_timeout).await?;
        let silences = parse::parse_silence(&output.stderr, duration);
        debug!("Detected {} silence intervals in {}", silences.len(), input.display());
        Ok(silences)
    }

    async fn cut_segment(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> Result<()> {
        let command = self
            .command_builder
            .cut_segment(input, start, duration, output, &self.segment);

        match self.runner.run(&command, self.idle_timeout).await {
            Ok(_) => Ok(()),
            Err(CutterError::ToolFailed { tail, .. }) if parse::is_seek_failure(&tail) => {
                Err(CutterError::UnsupportedSeek { start, detail: tail })
            }
            Err(e) => Err(e),
        }
    }

    async fn extract_thumbnail(&self, clip: &Path, at: f64, output: &Path) -> Result<()> {
        let command = self.command_builder.thumbnail(clip, at, output);
        self.runner.run(&command, self.idle_timeout).await?;
        Ok(())
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        info!("Normalizing {} -> {}", input.display(), output.display());
        let command = self.command_builder.transcode(input, output);
        self.runner.run(&command, self.idle_timeout).await?;
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        let command = self.command_builder.version_check();
        match self.runner.run(&command, self.idle_timeout).await {
            Ok(output) => {
                let version = output.stdout.lines().next().unwrap_or("Unknown version");
                info!("Media processor is available: {}", version);
                Ok(())
            }
            Err(e) => Err(CutterError::ToolMissing(format!("ffmpeg ({})", e)).with_hint(
                "Install FFmpeg and ensure ffmpeg/ffprobe are on PATH, or set FFMPEG_PATH and FFPROBE_PATH",
            )),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn processor(ffmpeg: &Path, ffprobe: &Path) -> FfmpegProcessor {
        let mut config = Config::default();
        config.tools.ffmpeg = ffmpeg.to_string_lossy().to_string();
        config.tools.ffprobe = ffprobe.to_string_lossy().to_string();
        config.timeouts.stream_idle_secs = 5;
        FfmpegProcessor::new(&config)
    }

    #[tokio::test]
    async fn probe_reads_duration_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_tool(dir.path(), "ffprobe", "echo 65.000000");
        let ffmpeg = fake_tool(dir.path(), "ffmpeg", "exit 0");
        let duration = processor(&ffmpeg, &ffprobe)
            .probe_duration(Path::new("in.mp4"))
            .await
            .unwrap();
        assert_eq!(duration, 65.0);
    }

    #[tokio::test]
    async fn probe_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_tool(dir.path(), "ffprobe", "echo 'in.mp4: Invalid data found' >&2; exit 1");
        let ffmpeg = fake_tool(dir.path(), "ffmpeg", "exit 0");
        let err = processor(&ffmpeg, &ffprobe)
            .probe_duration(Path::new("in.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CutterError::ProbeFailure(_)));
    }

    #[tokio::test]
    async fn near_end_cut_failure_is_unsupported_seek() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_tool(dir.path(), "ffprobe", "exit 0");
        let ffmpeg = fake_tool(
            dir.path(),
            "ffmpeg",
            "echo 'Output file #0 does not contain any stream' >&2; exit 1",
        );
        let err = processor(&ffmpeg, &ffprobe)
            .cut_segment(Path::new("in.mp4"), 64.8, 0.6, Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CutterError::UnsupportedSeek { .. }));
    }

    #[tokio::test]
    async fn other_cut_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = fake_tool(dir.path(), "ffprobe", "exit 0");
        let ffmpeg = fake_tool(dir.path(), "ffmpeg", "echo 'Unknown encoder libx264' >&2; exit 1");
        let err = processor(&ffmpeg, &ffprobe)
            .cut_segment(Path::new("in.mp4"), 0.0, 30.0, Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CutterError::ToolFailed { .. }));
    }
}
