use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

pub use crate::storage::queue::DedupPolicy;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CrawlerConfig {
    pub crawler: CrawlerSettings,
    pub scheduler: SchedulerSettings,
    pub downloader: DownloaderSettings,
    pub storage: StorageSettings,
}

/// What to crawl and how many workers to use
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CrawlerSettings {
    pub task_type: String,
    pub category: String,
    pub urls: Vec<String>,
    pub urls_file: Option<PathBuf>,
    pub consumers: usize,
    pub producer_delay_ms: (u64, u64),  // Min and max pause after each URL
}

/// Supervisor and queue settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
    pub dequeue_timeout_ms: u64,
    pub dedup: DedupPolicy,
}

/// HTML and image download settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DownloaderSettings {
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agents: Vec<String>,
}

/// Storage settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub uploader: UploaderSettings,
}

/// Remote image upload endpoint; local storage is used when disabled
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UploaderSettings {
    pub enabled: bool,
    pub upload_url: String,
    pub authorization: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawler: CrawlerSettings {
                task_type: "CSDN-URL".to_string(),
                category: "Programming".to_string(),
                urls: vec![],
                urls_file: Some(PathBuf::from("./data/dataset/csdn_urls.txt")),
                consumers: 1,
                producer_delay_ms: (1000, 1000),
            },
            scheduler: SchedulerSettings::default(),
            downloader: DownloaderSettings {
                retry_count: 3,
                retry_delay_ms: 1000,
                timeout_secs: 10,
                user_agents: vec![
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15".to_string(),
                    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0".to_string(),
                ],
            },
            storage: StorageSettings {
                data_dir: PathBuf::from("./data"),
                uploader: UploaderSettings {
                    enabled: false,
                    upload_url: "http://localhost:8080/api/upload".to_string(),
                    authorization: String::new(),
                },
            },
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            dequeue_timeout_ms: 1000,
            dedup: DedupPolicy::OnEnqueue,
        }
    }
}

impl CrawlerConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "article-crawler", "article-crawler") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            // Create and save the default configuration
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            if let Err(e) = config.save_as_default() {
                error!("Failed to save default configuration: {}", e);
            }
            Ok(config)
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        config.validate()
            .context(format!("Invalid configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject settings the pipeline cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.crawler.task_type.trim().is_empty() {
            anyhow::bail!("crawler.task_type must not be empty");
        }
        if self.crawler.consumers == 0 {
            anyhow::bail!("crawler.consumers must be at least 1");
        }
        if self.scheduler.tick_interval_ms == 0 {
            anyhow::bail!("scheduler.tick_interval_ms must be positive");
        }
        if self.scheduler.dequeue_timeout_ms == 0 {
            anyhow::bail!("scheduler.dequeue_timeout_ms must be positive");
        }
        if self.downloader.retry_count == 0 {
            anyhow::bail!("downloader.retry_count must be at least 1");
        }
        Ok(())
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        self.save_to_file(&Self::default_path())
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crawler.yaml");

        let mut config = CrawlerConfig::default();
        config.scheduler.dedup = DedupPolicy::OnDequeue;
        config.crawler.urls = vec!["https://example.com/a".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = CrawlerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_dedup_policy_yaml_names() {
        let yaml = serde_yaml::to_string(&SchedulerSettings::default()).unwrap();
        assert!(yaml.contains("dedup: on_enqueue"));

        let parsed: SchedulerSettings = serde_yaml::from_str(
            "tick_interval_ms: 500\ndequeue_timeout_ms: 200\ndedup: on_dequeue\n",
        ).unwrap();
        assert_eq!(parsed.dedup, DedupPolicy::OnDequeue);
        assert_eq!(parsed.tick_interval_ms, 500);
    }

    #[test]
    fn test_validate_rejects_zero_consumers() {
        let mut config = CrawlerConfig::default();
        assert!(config.validate().is_ok());

        config.crawler.consumers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "crawler: [not, a, map]").unwrap();
        assert!(CrawlerConfig::load_from_file(&path).is_err());
    }
}
