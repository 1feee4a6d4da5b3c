use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use tracing::debug;

use crate::cli::config::DownloaderSettings;
use crate::fetch::{build_client, random_user_agent};

/// Fetches image bytes, optionally keeping a copy on disk
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    client: Client,
    user_agents: Vec<String>,
    save_dir: Option<PathBuf>,
}

impl ImageDownloader {
    pub fn new(settings: &DownloaderSettings) -> Result<Self> {
        Ok(Self::with_client(build_client(settings)?, settings))
    }

    pub fn with_client(client: Client, settings: &DownloaderSettings) -> Self {
        Self {
            client,
            user_agents: settings.user_agents.clone(),
            save_dir: None,
        }
    }

    /// Keep downloaded files under `dir` when a filename is given
    pub fn with_save_dir(mut self, dir: PathBuf) -> Self {
        self.save_dir = Some(dir);
        self
    }

    /// Download an image; anything but HTTP 200 is an error
    pub async fn download_image(&self, url: &str, filename: Option<&str>) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(user_agent) = random_user_agent(&self.user_agents) {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        let response = request.send()
            .await
            .context(format!("Failed to download image: {}", url))?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("Image download failed for {}: HTTP {}", url, response.status());
        }

        let bytes = response.bytes()
            .await
            .context(format!("Failed to read image body: {}", url))?
            .to_vec();

        if let (Some(dir), Some(name)) = (&self.save_dir, filename) {
            tokio::fs::create_dir_all(dir)
                .await
                .context(format!("Failed to create directory: {}", dir.display()))?;
            let path = dir.join(name);
            tokio::fs::write(&path, &bytes)
                .await
                .context(format!("Failed to write image: {}", path.display()))?;
            debug!("Saved image {} to {}", url, path.display());
        }

        Ok(bytes)
    }
}
