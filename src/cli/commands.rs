use anyhow::{Result, Context};
use tracing::{info, warn};
use crate::crawler::controller::CrawlerController;
use crate::cli::config::{CrawlerConfig, DedupPolicy};
use std::path::PathBuf;

/// Command line values that take precedence over the configuration file
#[derive(Debug, Default, Clone)]
pub struct CrawlOverrides {
    pub urls_file: Option<PathBuf>,
    pub urls: Vec<String>,
    pub task_type: Option<String>,
    pub consumers: Option<usize>,
    pub dedup: Option<DedupPolicy>,
}

impl CrawlOverrides {
    /// URLs given on the command line replace both the configured list and
    /// the configured file, unless a file is given as well.
    pub fn apply(self, config: &mut CrawlerConfig) {
        if !self.urls.is_empty() {
            config.crawler.urls = self.urls;
            config.crawler.urls_file = None;
        }
        if let Some(path) = self.urls_file {
            config.crawler.urls_file = Some(path);
        }
        if let Some(task_type) = self.task_type {
            config.crawler.task_type = task_type;
        }
        if let Some(consumers) = self.consumers {
            config.crawler.consumers = consumers;
        }
        if let Some(dedup) = self.dedup {
            config.scheduler.dedup = dedup;
        }
    }
}

/// Run a crawl to completion. Ctrl-C stops producing; queued URLs are
/// still processed before the command returns.
pub async fn crawl(config_path: Option<PathBuf>, overrides: CrawlOverrides) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => CrawlerConfig::load_from_file(path)?,
        None => CrawlerConfig::load_default()?,
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid crawl settings")?;

    let controller = CrawlerController::new(config);
    let pipeline = controller.pipeline().await?;

    let scheduler = pipeline.scheduler();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing queued URLs before exiting");
            scheduler.stop();
            scheduler.stop_workers().await;
        }
    });

    let result = pipeline.run().await;
    interrupt.abort();
    let report = result?;

    let metrics = controller.metrics().get_metrics().await;
    println!("URLs emitted: {}", report.emitted);
    println!("Duplicates skipped: {}", report.duplicates);
    println!("Articles processed: {}", report.processed);
    println!("Failures: {}", report.failed);
    if let Some(average) = metrics.average_duration_ms() {
        println!("Average time per URL: {} ms", average);
    }
    if !metrics.failures_by_kind.is_empty() {
        println!("Failures by kind:");
        for (kind, count) in &metrics.failures_by_kind {
            println!("  - {}: {}", kind, count);
        }
    }

    info!("Crawl complete");
    Ok(())
}

/// Show the current configuration
pub async fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;
    println!("Configuration file: {}", CrawlerConfig::default_path().display());
    println!("{}", serde_yaml::to_string(&config).context("Failed to serialize configuration")?);

    Ok(())
}

/// Replace the default configuration file with built-in defaults
pub async fn reset_config() -> Result<()> {
    CrawlerConfig::default().save_as_default()?;
    println!("Default configuration written to {}", CrawlerConfig::default_path().display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_urls_replace_configured_sources() {
        let mut config = CrawlerConfig::default();
        config.crawler.urls = vec!["https://configured.test".to_string()];

        CrawlOverrides {
            urls: vec!["https://cli.test".to_string()],
            consumers: Some(3),
            dedup: Some(DedupPolicy::OnDequeue),
            ..Default::default()
        }.apply(&mut config);

        assert_eq!(config.crawler.urls, vec!["https://cli.test"]);
        assert_eq!(config.crawler.urls_file, None);
        assert_eq!(config.crawler.consumers, 3);
        assert_eq!(config.scheduler.dedup, DedupPolicy::OnDequeue);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = CrawlerConfig::default();
        let expected = config.clone();
        CrawlOverrides::default().apply(&mut config);
        assert_eq!(config, expected);
    }
}
