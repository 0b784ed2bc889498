use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{AcquireStrategy, resolve};
use crate::config::Config;
use crate::error::{CutterError, Result};

/// Direct media fetch. Only a gap between chunks longer than the idle
/// timeout fails the transfer; total transfer time is unbounded.
pub struct HttpStreamStrategy {
    client: Client,
    downloads_dir: PathBuf,
    idle_timeout: Duration,
}

impl HttpStreamStrategy {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("shorts-cutter/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;

        Ok(Self {
            client,
            downloads_dir: config.downloads_dir(),
            idle_timeout: config.stream_idle(),
        })
    }

    fn stall(&self) -> CutterError {
        CutterError::Stall {
            tool: "http".to_string(),
            idle_secs: self.idle_timeout.as_secs(),
        }
    }
}

/// Container extension taken from the URL path, `mp4` when unknown.
pub fn extension_from_url(url: &str) -> &'static str {
    let Ok(parsed) = Url::parse(url) else {
        return "mp4";
    };
    let Some(ext) = parsed
        .path()
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
    else {
        return "mp4";
    };

    resolve::OUTPUT_EXTENSIONS
        .into_iter()
        .find(|known| *known == ext)
        .unwrap_or("mp4")
}

#[async_trait]
impl AcquireStrategy for HttpStreamStrategy {
    fn name(&self) -> String {
        "http stream".to_string()
    }

    async fn fetch(&self, url: &str, job_id: &str) -> Result<PathBuf> {
        async_fs::create_dir_all(&self.downloads_dir).await?;

        let response = tokio::time::timeout(self.idle_timeout, self.client.get(url).send())
            .await
            .map_err(|_| self.stall())??;

        if !response.status().is_success() {
            return Err(CutterError::stage(
                "acquire",
                format!("HTTP {} from {}", response.status(), url),
            ));
        }

        let path = self
            .downloads_dir
            .join(format!("{}.{}", job_id, extension_from_url(url)));
        info!("Streaming {} to {}", url, path.display());

        let mut file = async_fs::File::create(&path).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        loop {
            match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Err(_) => return Err(self.stall()),
                Ok(None) => break,
                Ok(Some(chunk)) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
            }
        }
        file.flush().await?;

        debug!("Fetched {} bytes for job {}", written, job_id);
        Ok(path)
    }
}
