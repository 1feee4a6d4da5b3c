use anyhow::Result;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::cli::config::DownloaderSettings;
use crate::crawler::task::ProcessError;
use crate::fetch::{build_client, random_user_agent};

/// Page downloader with a fixed number of attempts and a fixed pause between them
#[derive(Debug, Clone)]
pub struct HtmlDownloader {
    client: Client,
    retry_count: u32,
    retry_delay: Duration,
    user_agents: Vec<String>,
}

impl HtmlDownloader {
    pub fn new(settings: &DownloaderSettings) -> Result<Self> {
        Ok(Self::with_client(build_client(settings)?, settings))
    }

    pub fn with_client(client: Client, settings: &DownloaderSettings) -> Self {
        Self {
            client,
            retry_count: settings.retry_count.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            user_agents: settings.user_agents.clone(),
        }
    }

    /// Download a page body. Non-200 responses and transport errors are
    /// retried; the last failure is reported once attempts run out.
    pub async fn download(&self, url: &str) -> Result<String, ProcessError> {
        let mut last_error = String::new();

        for attempt in 1..=self.retry_count {
            info!("Downloading {} (attempt {}/{})", url, attempt, self.retry_count);

            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!("Downloaded {} ({} bytes)", url, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    error!("Error downloading {}: {}", url, e);
                    last_error = e;
                }
            }

            if attempt < self.retry_count {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!("Giving up on {} after {} attempt(s)", url, self.retry_count);
        Err(ProcessError::Fetch {
            url: url.to_string(),
            attempts: self.retry_count,
            reason: last_error,
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, String> {
        let mut request = self.client.get(url);
        if let Some(user_agent) = random_user_agent(&self.user_agents) {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status() != StatusCode::OK {
            return Err(format!("HTTP {}", response.status()));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}
