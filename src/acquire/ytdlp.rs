use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{AcquireStrategy, resolve};
use crate::config::Config;
use crate::error::{CutterError, Result};
use crate::media::MediaCommand;
use crate::process::ProcessRunner;
use crate::setup::{Downloader, SetupManager};

const COMBINED_FORMAT: &str = "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b";

/// Which downloader invocation this strategy performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Best video+audio merged into mp4
    Combined,
    /// Best single stream, re-encoded to mp4
    Recode,
}

pub struct YtDlpStrategy {
    attempt: Attempt,
    setup: Arc<SetupManager>,
    runner: ProcessRunner,
    downloads_dir: PathBuf,
    idle_timeout: Duration,
    concurrent_fragments: u32,
    retries: u32,
}

impl YtDlpStrategy {
    pub fn new(attempt: Attempt, setup: Arc<SetupManager>, config: &Config) -> Self {
        Self {
            attempt,
            setup,
            runner: ProcessRunner::default(),
            downloads_dir: config.downloads_dir(),
            idle_timeout: config.download_idle(),
            concurrent_fragments: config.acquisition.concurrent_fragments,
            retries: config.acquisition.retries,
        }
    }

    pub fn command(&self, downloader: &Downloader, url: &str, job_id: &str) -> MediaCommand {
        let template = self.downloads_dir.join(format!("{}.%(ext)s", job_id));
        let description = match self.attempt {
            Attempt::Combined => "Download (combined streams)",
            Attempt::Recode => "Download (best stream, recode)",
        };

        let command = downloader.command(description);
        let command = match self.attempt {
            Attempt::Combined => command
                .args(["-f", COMBINED_FORMAT])
                .args(["--merge-output-format", "mp4"]),
            Attempt::Recode => command.args(["-f", "best"]).args(["--recode-video", "mp4"]),
        };

        command
            .arg("--retries")
            .arg(self.retries.to_string())
            .arg("--fragment-retries")
            .arg(self.retries.to_string())
            .args(["--retry-sleep", "exp=1:30"])
            .arg("--concurrent-fragments")
            .arg(self.concurrent_fragments.to_string())
            .args(["--newline", "--no-playlist"])
            .arg("-o")
            .arg(template.to_string_lossy().to_string())
            .arg(url)
    }
}

#[async_trait]
impl AcquireStrategy for YtDlpStrategy {
    fn name(&self) -> String {
        match self.attempt {
            Attempt::Combined => "yt-dlp combined".to_string(),
            Attempt::Recode => "yt-dlp recode".to_string(),
        }
    }

    async fn fetch(&self, url: &str, job_id: &str) -> Result<PathBuf> {
        let downloader = self.setup.locate_downloader().await?;
        std::fs::create_dir_all(&self.downloads_dir)?;

        let command = self.command(&downloader, url, job_id);
        info!("{} for job {}", command.description, job_id);
        self.runner.run(&command, self.idle_timeout).await?;

        resolve::resolve_output(&self.downloads_dir, job_id).ok_or_else(|| {
            CutterError::stage(
                "acquire",
                format!("downloader finished but no output file for job {}", job_id),
            )
        })
    }
}
