// Acquisition: source URL -> local media file in the canonical container
//
// - Platform: hosted-video URL classification
// - Strategies: ordered fetch attempts (downloader invocations, direct HTTP)
// - Resolve: output lookup and per-job cleanup in downloads/

pub mod http;
pub mod platform;
pub mod resolve;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use http::HttpStreamStrategy;
pub use platform::Platform;
pub use ytdlp::{Attempt, YtDlpStrategy};

use crate::config::Config;
use crate::error::{CutterError, Result};
use crate::media::MediaProcessorTrait;
use crate::setup::SetupManager;

const PLATFORM_HINT: &str = "Check that the video is public and reachable, and install or update yt-dlp \
     (pip install -U yt-dlp) or point YTDLP_PATH at a working binary";

/// One way of turning a URL into a file under downloads/.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AcquireStrategy: Send + Sync {
    fn name(&self) -> String;

    async fn fetch(&self, url: &str, job_id: &str) -> Result<PathBuf>;
}

/// Try each strategy in order and return the first success. A missing tool
/// ends the chain since later attempts share the same tool.
pub async fn run_chain(
    strategies: &[Box<dyn AcquireStrategy>],
    url: &str,
    job_id: &str,
) -> Result<PathBuf> {
    let mut last_error = None;

    for strategy in strategies {
        match strategy.fetch(url, job_id).await {
            Ok(path) => {
                info!("{} produced {}", strategy.name(), path.display());
                return Ok(path);
            }
            Err(e) => {
                warn!("{} failed for job {}: {}", strategy.name(), job_id, e);
                let missing_tool = matches!(e.root(), CutterError::ToolMissing(_));
                last_error = Some(e);
                if missing_tool {
                    break;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| CutterError::stage("acquire", format!("no strategy for {}", url))))
}

pub struct Acquirer {
    downloads_dir: PathBuf,
    min_download_bytes: u64,
    canonical_container: String,
    media: Arc<dyn MediaProcessorTrait>,
    platform_chain: Vec<Box<dyn AcquireStrategy>>,
    generic_chain: Vec<Box<dyn AcquireStrategy>>,
}

impl Acquirer {
    pub fn new(
        config: &Config,
        setup: Arc<SetupManager>,
        media: Arc<dyn MediaProcessorTrait>,
    ) -> Result<Self> {
        let platform_chain: Vec<Box<dyn AcquireStrategy>> = vec![
            Box::new(YtDlpStrategy::new(Attempt::Combined, setup.clone(), config)),
            Box::new(YtDlpStrategy::new(Attempt::Recode, setup, config)),
        ];
        let generic_chain: Vec<Box<dyn AcquireStrategy>> =
            vec![Box::new(HttpStreamStrategy::new(config)?)];

        Ok(Self::with_strategies(config, media, platform_chain, generic_chain))
    }

    pub fn with_strategies(
        config: &Config,
        media: Arc<dyn MediaProcessorTrait>,
        platform_chain: Vec<Box<dyn AcquireStrategy>>,
        generic_chain: Vec<Box<dyn AcquireStrategy>>,
    ) -> Self {
        Self {
            downloads_dir: config.downloads_dir(),
            min_download_bytes: config.acquisition.min_download_bytes,
            canonical_container: config.acquisition.canonical_container.clone(),
            media,
            platform_chain,
            generic_chain,
        }
    }

    /// Fetch `source_url` for `job_id`. On failure nothing of the job is left
    /// in downloads/.
    pub async fn acquire(&self, source_url: &str, job_id: &str) -> Result<PathBuf> {
        let platform = Platform::detect(source_url);

        match self.try_acquire(source_url, job_id, platform).await {
            Ok(path) => Ok(path),
            Err(e) => {
                let removed = resolve::cleanup_job(&self.downloads_dir, job_id);
                if removed > 0 {
                    info!("Removed {} partial artifact(s) for job {}", removed, job_id);
                }
                match platform {
                    Some(_) => Err(e.with_hint(PLATFORM_HINT)),
                    None => Err(e),
                }
            }
        }
    }

    async fn try_acquire(
        &self,
        source_url: &str,
        job_id: &str,
        platform: Option<Platform>,
    ) -> Result<PathBuf> {
        let chain = match platform {
            Some(p) => {
                info!("Acquiring {} video for job {}", p.label(), job_id);
                &self.platform_chain
            }
            None => {
                info!("Acquiring direct media for job {}", job_id);
                &self.generic_chain
            }
        };

        let fetched = run_chain(chain, source_url, job_id).await?;
        resolve::remove_leftovers(&self.downloads_dir, job_id, &fetched);

        let bytes = std::fs::metadata(&fetched)?.len();
        if bytes < self.min_download_bytes {
            return Err(CutterError::DownloadTooSmall {
                path: fetched.display().to_string(),
                bytes,
                min_bytes: self.min_download_bytes,
            });
        }

        self.normalize(fetched, job_id).await
    }

    async fn normalize(&self, fetched: PathBuf, job_id: &str) -> Result<PathBuf> {
        if has_extension(&fetched, &self.canonical_container) {
            return Ok(fetched);
        }

        let target = self
            .downloads_dir
            .join(format!("{}.{}", job_id, self.canonical_container));
        self.media.transcode(&fetched, &target).await?;
        if let Err(e) = std::fs::remove_file(&fetched) {
            warn!("Could not remove {}: {}", fetched.display(), e);
        }
        Ok(target)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaProcessorTrait;
    use mockall::predicate::eq;

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.storage.root = root.to_path_buf();
        config.acquisition.min_download_bytes = 1024;
        config
    }

    fn writes_file(dir: PathBuf, name: &'static str, bytes: usize) -> MockAcquireStrategy {
        let mut strategy = MockAcquireStrategy::new();
        strategy.expect_name().return_const("writer".to_string());
        strategy.expect_fetch().times(1).returning(move |_, _| {
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            std::fs::write(&path, vec![1u8; bytes]).unwrap();
            Ok(path)
        });
        strategy
    }

    fn fails_with(err: fn() -> CutterError) -> MockAcquireStrategy {
        let mut strategy = MockAcquireStrategy::new();
        strategy.expect_name().return_const("failing".to_string());
        strategy.expect_fetch().times(1).returning(move |_, _| Err(err()));
        strategy
    }

    #[tokio::test]
    async fn chain_falls_through_to_second_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let chain: Vec<Box<dyn AcquireStrategy>> = vec![
            Box::new(fails_with(|| CutterError::ToolFailed {
                tool: "yt-dlp".to_string(),
                code: Some(1),
                tail: "Requested format is not available".to_string(),
            })),
            Box::new(writes_file(dir.path().to_path_buf(), "job1.mp4", 10)),
        ];

        let path = run_chain(&chain, "https://youtu.be/abc", "job1").await.unwrap();
        assert_eq!(path, dir.path().join("job1.mp4"));
    }

    #[tokio::test]
    async fn missing_tool_stops_chain() {
        let mut never = MockAcquireStrategy::new();
        never.expect_fetch().times(0);
        let chain: Vec<Box<dyn AcquireStrategy>> = vec![
            Box::new(fails_with(|| CutterError::ToolMissing("yt-dlp".to_string()))),
            Box::new(never),
        ];

        let err = run_chain(&chain, "https://youtu.be/abc", "job1").await.unwrap_err();
        assert!(matches!(err, CutterError::ToolMissing(_)));
    }

    #[tokio::test]
    async fn platform_failure_cleans_up_and_adds_hint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let downloads = config.downloads_dir();
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("job1.mp4.part"), b"partial").unwrap();

        let chain: Vec<Box<dyn AcquireStrategy>> = vec![
            Box::new(fails_with(|| CutterError::Stall {
                tool: "yt-dlp".to_string(),
                idle_secs: 900,
            })),
            Box::new(fails_with(|| CutterError::Stall {
                tool: "yt-dlp".to_string(),
                idle_secs: 900,
            })),
        ];
        let acquirer = Acquirer::with_strategies(
            &config,
            Arc::new(MockMediaProcessorTrait::new()),
            chain,
            Vec::new(),
        );

        let err = acquirer
            .acquire("https://www.twitch.tv/videos/123", "job1")
            .await
            .unwrap_err();
        assert!(err.is_stall());
        assert!(err.to_string().contains("yt-dlp"));
        assert!(matches!(err, CutterError::WithHint { .. }));
        assert!(!downloads.join("job1.mp4.part").exists());
    }

    #[tokio::test]
    async fn unmerged_formats_from_failed_attempt_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let downloads = config.downloads_dir();

        let leftovers = downloads.clone();
        let mut unmerged = MockAcquireStrategy::new();
        unmerged.expect_name().return_const("combined".to_string());
        unmerged.expect_fetch().times(1).returning(move |_, _| {
            std::fs::create_dir_all(&leftovers).unwrap();
            std::fs::write(leftovers.join("job1.f137.mp4"), vec![1u8; 4096]).unwrap();
            std::fs::write(leftovers.join("job1.f140.m4a"), vec![1u8; 4096]).unwrap();
            Err(CutterError::ToolFailed {
                tool: "yt-dlp".to_string(),
                code: Some(1),
                tail: "Postprocessing: Conversion failed!".to_string(),
            })
        });
        let chain: Vec<Box<dyn AcquireStrategy>> = vec![
            Box::new(unmerged),
            Box::new(writes_file(downloads.clone(), "job1.mp4", 4096)),
        ];
        let acquirer = Acquirer::with_strategies(
            &config,
            Arc::new(MockMediaProcessorTrait::new()),
            chain,
            Vec::new(),
        );

        let path = acquirer.acquire("https://youtu.be/abc", "job1").await.unwrap();
        assert_eq!(path, downloads.join("job1.mp4"));
        let remaining: Vec<_> = std::fs::read_dir(&downloads)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("job1.mp4")]);
    }

    #[tokio::test]
    async fn tiny_download_is_rejected_without_residue() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let downloads = config.downloads_dir();

        let acquirer = Acquirer::with_strategies(
            &config,
            Arc::new(MockMediaProcessorTrait::new()),
            Vec::new(),
            vec![Box::new(writes_file(downloads.clone(), "job1.mp4", 200))],
        );

        let err = acquirer
            .acquire("https://cdn.example.com/clip.mp4", "job1")
            .await
            .unwrap_err();
        assert!(matches!(err, CutterError::DownloadTooSmall { bytes: 200, .. }));
        assert_eq!(std::fs::read_dir(&downloads).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn foreign_container_is_transcoded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let downloads = config.downloads_dir();
        let source = downloads.join("job1.webm");
        let target = downloads.join("job1.mp4");

        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_transcode()
            .with(eq(source.clone()), eq(target.clone()))
            .times(1)
            .returning(|_, output| {
                std::fs::write(output, vec![0u8; 2048]).unwrap();
                Ok(())
            });

        let acquirer = Acquirer::with_strategies(
            &config,
            Arc::new(media),
            Vec::new(),
            vec![Box::new(writes_file(downloads.clone(), "job1.webm", 4096))],
        );

        let path = acquirer
            .acquire("https://cdn.example.com/clip.webm", "job1")
            .await
            .unwrap();
        assert_eq!(path, target);
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn two_hundred_byte_response_is_too_small() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 200]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.acquisition.min_download_bytes = 64 * 1024;
        let acquirer = Acquirer::with_strategies(
            &config,
            Arc::new(MockMediaProcessorTrait::new()),
            Vec::new(),
            vec![Box::new(HttpStreamStrategy::new(&config).unwrap())],
        );

        let err = acquirer
            .acquire(&format!("{}/video.mp4", server.uri()), "job1")
            .await
            .unwrap_err();
        assert!(matches!(err, CutterError::DownloadTooSmall { .. }));
        assert_eq!(std::fs::read_dir(config.downloads_dir()).unwrap().count(), 0);
    }
}
