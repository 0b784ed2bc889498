use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs as async_fs;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CutterError, Result};
use crate::media::MediaCommand;
use crate::process::ProcessRunner;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// How the specialized downloader is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downloader {
    /// A yt-dlp executable
    Binary(PathBuf),
    /// The yt_dlp python package, run as `python -m yt_dlp`
    PythonModule { python: String },
}

impl Downloader {
    /// Base command; callers append downloader arguments.
    pub fn command<S: Into<String>>(&self, description: S) -> MediaCommand {
        match self {
            Downloader::Binary(path) => {
                MediaCommand::new(path.to_string_lossy().to_string(), description)
            }
            Downloader::PythonModule { python } => {
                MediaCommand::new(python, description).args(["-m", "yt_dlp"])
            }
        }
    }
}

/// Locates the downloader once per process and caches the answer.
pub struct SetupManager {
    client: Client,
    bin_dir: PathBuf,
    configured: Option<String>,
    release_url: String,
    python: String,
    runner: ProcessRunner,
    idle_timeout: Duration,
    downloader: OnceCell<Downloader>,
}

impl SetupManager {
    pub fn new(config: &Config) -> Result<Self> {
        let bin_dir = config.bin_dir();
        std::fs::create_dir_all(&bin_dir)?;

        let client = Client::builder()
            .user_agent(concat!("shorts-cutter/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(CutterError::Http)?;

        Ok(Self {
            client,
            bin_dir,
            configured: config.tools.downloader.clone(),
            release_url: config.tools.downloader_release_url.clone(),
            python: config.tools.python.clone(),
            runner: ProcessRunner::default(),
            idle_timeout: config.stream_idle(),
            downloader: OnceCell::new(),
        })
    }

    /// Find a usable downloader: configured path, PATH, bin cache, fresh
    /// install into the bin cache, then the python module.
    pub async fn locate_downloader(&self) -> Result<Downloader> {
        self.downloader
            .get_or_try_init(|| self.resolve_downloader())
            .await
            .cloned()
    }

    async fn resolve_downloader(&self) -> Result<Downloader> {
        if let Some(configured) = &self.configured {
            match which::which(configured) {
                Ok(path) => {
                    info!("Using configured downloader: {}", path.display());
                    return Ok(Downloader::Binary(path));
                }
                Err(e) => warn!("Configured downloader {} not usable: {}", configured, e),
            }
        }

        if let Ok(path) = which::which("yt-dlp") {
            info!("Using downloader from PATH: {}", path.display());
            return Ok(Downloader::Binary(path));
        }

        let cached = self.cached_binary_path();
        if cached.exists() && self.responds_to_version(&cached).await {
            info!("Using cached downloader: {}", cached.display());
            return Ok(Downloader::Binary(cached));
        }

        match self.install_downloader().await {
            Ok(path) => return Ok(Downloader::Binary(path)),
            Err(e) => warn!("Downloader install failed: {}", e),
        }

        if self.python_module_available().await {
            info!("Falling back to python yt_dlp module via {}", self.python);
            return Ok(Downloader::PythonModule {
                python: self.python.clone(),
            });
        }

        Err(CutterError::ToolMissing(
            "yt-dlp (not on PATH, not cached, install failed, python module missing)".to_string(),
        ))
    }

    /// Location of the downloader inside the storage bin cache
    pub fn cached_binary_path(&self) -> PathBuf {
        let name = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };
        self.bin_dir.join(name)
    }

    /// Download the pinned release artifact into the bin cache
    pub async fn install_downloader(&self) -> Result<PathBuf> {
        let local_path = self.cached_binary_path();
        let temp_path = local_path.with_extension("tmp");
        info!("Downloading yt-dlp from {}", self.release_url);

        if let Err(e) = self.fetch_release(&temp_path).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = make_executable(&temp_path).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(e);
        }
        async_fs::rename(&temp_path, &local_path).await?;

        if !self.responds_to_version(&local_path).await {
            let _ = async_fs::remove_file(&local_path).await;
            return Err(CutterError::ToolMissing(format!(
                "downloaded {} does not run",
                local_path.display()
            )));
        }

        info!("Installed yt-dlp to {}", local_path.display());
        Ok(local_path)
    }

    /// Stream the release body into `temp_path`; a gap longer than the idle
    /// timeout between the request and a chunk, or between chunks, is a stall.
    async fn fetch_release(&self, temp_path: &Path) -> Result<()> {
        let mut response = tokio::time::timeout(self.idle_timeout, self.client.get(&self.release_url).send())
            .await
            .map_err(|_| self.stall())??;
        if !response.status().is_success() {
            return Err(CutterError::stage(
                "downloader install",
                format!("HTTP {} from {}", response.status(), self.release_url),
            ));
        }

        let total = response.content_length().unwrap_or(0);
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut file = async_fs::File::create(temp_path).await?;

        use tokio::io::AsyncWriteExt;
        let mut downloaded = 0u64;
        loop {
            let chunk = tokio::time::timeout(self.idle_timeout, response.chunk())
                .await
                .map_err(|_| self.stall())??;
            let Some(chunk) = chunk else {
                break;
            };
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;
        pb.finish_with_message("Downloaded yt-dlp");
        Ok(())
    }

    fn stall(&self) -> CutterError {
        CutterError::Stall {
            tool: "yt-dlp install".to_string(),
            idle_secs: self.idle_timeout.as_secs(),
        }
    }

    async fn responds_to_version(&self, binary: &Path) -> bool {
        let command = MediaCommand::new(binary.to_string_lossy().to_string(), "Downloader version check")
            .arg("--version");
        match self.runner.run(&command, VERSION_CHECK_TIMEOUT).await {
            Ok(output) => {
                debug!("{} version {}", binary.display(), output.stdout.trim());
                true
            }
            Err(e) => {
                debug!("{} is not usable: {}", binary.display(), e);
                false
            }
        }
    }

    async fn python_module_available(&self) -> bool {
        let command = MediaCommand::new(&self.python, "Python yt_dlp check")
            .args(["-c", "import yt_dlp"]);
        self.runner.run(&command, VERSION_CHECK_TIMEOUT).await.is_ok()
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    async_fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_fallback_runs_module() {
        let downloader = Downloader::PythonModule {
            python: "python3".to_string(),
        };
        let cmd = downloader.command("download").arg("--version");
        assert_eq!(cmd.binary_path, "python3");
        assert_eq!(cmd.args, vec!["-m", "yt_dlp", "--version"]);
    }

    #[test]
    fn cache_lives_under_storage_bin() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();
        let setup = SetupManager::new(&config).unwrap();
        assert!(setup.cached_binary_path().starts_with(dir.path().join("bin")));
        assert!(dir.path().join("bin").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn configured_downloader_wins() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-yt-dlp");
        std::fs::write(&fake, "#!/bin/sh\necho 2024.08.06\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.storage.root = dir.path().join("storage");
        config.tools.downloader = Some(fake.to_string_lossy().to_string());

        let setup = SetupManager::new(&config).unwrap();
        let found = setup.locate_downloader().await.unwrap();
        assert_eq!(found, Downloader::Binary(fake));
    }

    #[tokio::test]
    async fn silent_release_server_is_a_stall() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();
        config.tools.downloader_release_url = format!("{}/yt-dlp", server.uri());
        let mut setup = SetupManager::new(&config).unwrap();
        setup.idle_timeout = Duration::from_millis(200);

        let started = std::time::Instant::now();
        let err = setup.install_downloader().await.unwrap_err();
        assert!(err.is_stall());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!setup.cached_binary_path().exists());
        assert!(!setup.cached_binary_path().with_extension("tmp").exists());
    }
}
