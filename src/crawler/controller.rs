use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::config::{CrawlerConfig, SchedulerSettings};
use crate::crawler::article::ArticleProcessor;
use crate::crawler::consumer::{Consumer, ConsumerReport, Processor};
use crate::crawler::producer::{Producer, ProducerReport};
use crate::crawler::scheduler::Scheduler;
use crate::crawler::source::{StaticUrlSource, UrlSource};
use crate::storage::{HttpUploader, LocalPersistence, Persistence};
use crate::utils::metrics::MetricsCollector;

/// Totals for a finished crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub emitted: usize,
    pub duplicates: usize,
    pub processed: usize,
    pub failed: usize,
    pub producers: Vec<ProducerReport>,
    pub consumers: Vec<ConsumerReport>,
}

impl CrawlReport {
    fn collect(producers: Vec<ProducerReport>, consumers: Vec<ConsumerReport>) -> Self {
        Self {
            emitted: producers.iter().map(|p| p.emitted).sum(),
            duplicates: producers.iter().map(|p| p.duplicates).sum(),
            processed: consumers.iter().map(|c| c.processed).sum(),
            failed: consumers.iter().map(|c| c.failed).sum(),
            producers,
            consumers,
        }
    }
}

struct Pending<T> {
    task_type: String,
    run: BoxFuture<'static, T>,
}

/// One crawl run: a scheduler plus the workers registered against it.
///
/// Workers are registered when they are added, so the supervisor never sees
/// an empty producer list before the producers exist. `start` then spawns
/// the supervisor, the producers and finally the consumers.
pub struct Pipeline {
    scheduler: Arc<Scheduler>,
    pending_producers: Vec<Pending<ProducerReport>>,
    pending_consumers: Vec<Pending<ConsumerReport>>,
    supervisor: Option<JoinHandle<()>>,
    producers: Vec<JoinHandle<ProducerReport>>,
    consumers: Vec<JoinHandle<ConsumerReport>>,
}

impl Pipeline {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self::with_scheduler(Scheduler::new(settings))
    }

    pub fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            pending_producers: Vec::new(),
            pending_consumers: Vec::new(),
            supervisor: None,
            producers: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Create and register a producer for `task_type`
    pub async fn add_producer<S: UrlSource + 'static>(
        &mut self,
        task_type: &str,
        source: S,
        delay_ms: (u64, u64),
    ) {
        let producer = Producer::new(self.scheduler(), task_type, source)
            .await
            .with_delay(delay_ms.0, delay_ms.1);
        self.pending_producers.push(Pending {
            task_type: task_type.to_string(),
            run: producer.run().boxed(),
        });
    }

    /// Create and register a consumer for `task_type`
    pub async fn add_consumer<P: Processor + 'static>(
        &mut self,
        task_type: &str,
        processor: P,
        metrics: Option<MetricsCollector>,
    ) {
        let mut consumer = Consumer::new(self.scheduler(), task_type, processor).await;
        if let Some(metrics) = metrics {
            consumer = consumer.with_metrics(metrics);
        }
        self.pending_consumers.push(Pending {
            task_type: task_type.to_string(),
            run: consumer.run().boxed(),
        });
    }

    /// Spawn the supervisor, then producers, then consumers.
    /// Refuses to start if some produced task type has no consumer,
    /// since that queue could never drain.
    pub fn start(&mut self) -> Result<()> {
        if self.supervisor.is_some() {
            anyhow::bail!("Pipeline already started");
        }

        let consumed: HashSet<&str> = self.pending_consumers.iter()
            .map(|c| c.task_type.as_str())
            .collect();
        if let Some(orphan) = self.pending_producers.iter().find(|p| !consumed.contains(p.task_type.as_str())) {
            anyhow::bail!("No consumer registered for task type '{}'", orphan.task_type);
        }

        info!(
            "Starting pipeline with {} producer(s) and {} consumer(s)",
            self.pending_producers.len(),
            self.pending_consumers.len()
        );

        self.supervisor = Some(self.scheduler.start());
        self.producers = self.pending_producers.drain(..)
            .map(|p| tokio::spawn(p.run))
            .collect();
        self.consumers = self.pending_consumers.drain(..)
            .map(|c| tokio::spawn(c.run))
            .collect();

        Ok(())
    }

    /// Wait for every worker and the supervisor to finish.
    ///
    /// A worker that died (panicked) stops the whole run; the remaining
    /// workers are still joined so none is left running detached, and the
    /// first failure is returned.
    pub async fn join(mut self) -> Result<CrawlReport> {
        let mut failure: Option<anyhow::Error> = None;

        let mut producer_reports = Vec::with_capacity(self.producers.len());
        for handle in std::mem::take(&mut self.producers) {
            match handle.await.context("Producer task failed") {
                Ok(report) => producer_reports.push(report),
                Err(e) => self.record_failure(&mut failure, e).await,
            }
        }

        let mut consumer_reports = Vec::with_capacity(self.consumers.len());
        for handle in std::mem::take(&mut self.consumers) {
            match handle.await.context("Consumer task failed") {
                Ok(report) => consumer_reports.push(report),
                Err(e) => self.record_failure(&mut failure, e).await,
            }
        }

        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await.context("Scheduler task failed") {
                self.record_failure(&mut failure, e).await;
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let report = CrawlReport::collect(producer_reports, consumer_reports);
        info!(
            "Crawl finished: {} emitted, {} duplicate(s), {} processed, {} failed",
            report.emitted, report.duplicates, report.processed, report.failed
        );
        Ok(report)
    }

    async fn record_failure(&self, failure: &mut Option<anyhow::Error>, e: anyhow::Error) {
        error!("{:#}", e);
        self.stop().await;
        failure.get_or_insert(e);
    }

    pub async fn run(mut self) -> Result<CrawlReport> {
        self.start()?;
        self.join().await
    }

    /// Stop the scheduler and ask every worker to wind down.
    /// Consumers still drain whatever is queued.
    pub async fn stop(&self) {
        if self.scheduler.stop() {
            warn!("Stopping crawl before completion");
        }
        self.scheduler.stop_workers().await;
    }
}

/// Builds the article crawl described by a `CrawlerConfig`
pub struct CrawlerController {
    config: CrawlerConfig,
    metrics: MetricsCollector,
}

impl CrawlerController {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            config,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// URLs listed in the config followed by the URL file, if any
    pub fn url_source(&self) -> Result<StaticUrlSource> {
        let mut source = StaticUrlSource::new(self.config.crawler.urls.iter().cloned());
        if let Some(path) = &self.config.crawler.urls_file {
            source.extend(StaticUrlSource::from_file(path)?.into_urls());
        }
        Ok(source)
    }

    /// Wire up one producer and the configured number of consumers
    pub async fn pipeline(&self) -> Result<Pipeline> {
        let settings = &self.config.crawler;
        let persistence: Arc<dyn Persistence> = Arc::new(
            LocalPersistence::new(&self.config.storage.data_dir).await?,
        );

        let mut processor = ArticleProcessor::new(&self.config.downloader, persistence, settings.category.as_str())?;
        if self.config.storage.uploader.enabled {
            info!("Uploading images to {}", self.config.storage.uploader.upload_url);
            processor = processor.with_uploader(Arc::new(HttpUploader::new(&self.config.storage.uploader)?));
        }
        let processor = Arc::new(processor);

        let mut pipeline = Pipeline::new(&self.config.scheduler);
        pipeline.add_producer(&settings.task_type, self.url_source()?, settings.producer_delay_ms).await;
        for _ in 0..settings.consumers.max(1) {
            pipeline.add_consumer(&settings.task_type, Arc::clone(&processor), Some(self.metrics.clone())).await;
        }

        Ok(pipeline)
    }

    pub async fn run(&self) -> Result<CrawlReport> {
        self.pipeline().await?.run().await
    }
}
