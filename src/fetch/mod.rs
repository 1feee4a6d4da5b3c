pub mod html;
pub mod image;

use anyhow::{Context, Result};
use rand::{thread_rng, Rng};
use reqwest::Client;
use std::time::Duration;

use crate::cli::config::DownloaderSettings;

// Re-export common types
pub use html::HtmlDownloader;
pub use image::ImageDownloader;

/// Build the HTTP client shared by the downloaders.
/// System proxies are ignored.
pub fn build_client(settings: &DownloaderSettings) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .no_proxy()
        .build()
        .context("Failed to create HTTP client")
}

/// Pick a user agent at random, if any are configured
pub fn random_user_agent(user_agents: &[String]) -> Option<&str> {
    if user_agents.is_empty() {
        return None;
    }
    let mut rng = thread_rng();
    Some(user_agents[rng.gen_range(0..user_agents.len())].as_str())
}
