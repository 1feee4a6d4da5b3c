use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::crawler::scheduler::Scheduler;
use crate::crawler::task::{ArticleRecord, ProcessError, Task};
use crate::crawler::worker::{WorkerHandle, WorkerRole, WorkerState};
use crate::utils::metrics::MetricsCollector;

/// Turns one URL into a stored article
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, url: &str) -> Result<ArticleRecord, ProcessError>;
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(&self, url: &str) -> Result<ArticleRecord, ProcessError> {
        (**self).process(url).await
    }
}

/// Outcome of one consumer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub task_type: String,
    pub processed: usize,
    pub failed: usize,
}

/// Claims tasks of one type and hands them to a processor
pub struct Consumer<P> {
    scheduler: Arc<Scheduler>,
    task_type: String,
    processor: P,
    handle: WorkerHandle,
    metrics: Option<MetricsCollector>,
}

impl<P: Processor + 'static> Consumer<P> {
    /// Create a consumer and register it (and its task type) with the scheduler
    pub async fn new(scheduler: Arc<Scheduler>, task_type: impl Into<String>, processor: P) -> Self {
        let task_type = task_type.into();
        let handle = WorkerHandle::new(WorkerRole::Consumer, task_type.clone());
        scheduler.register_consumer(handle.clone()).await;

        Self {
            scheduler,
            task_type,
            processor,
            handle,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Run the consumer loop on its own task
    pub fn start(self) -> JoinHandle<ConsumerReport> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> ConsumerReport {
        let mut report = ConsumerReport {
            task_type: self.task_type.clone(),
            ..Default::default()
        };

        let guard = self.handle.stop_guard();
        self.handle.advance(WorkerState::Running);
        info!("Consumer {} started", self.task_type);

        while self.should_keep_running().await {
            let timeout = self.scheduler.dequeue_timeout();
            let task = match self.scheduler.queues().dequeue(&self.task_type, timeout).await {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(e) => {
                    error!("Consumer {} cannot read its queue: {}", self.task_type, e);
                    break;
                }
            };

            if self.handle_task(&task).await {
                report.processed += 1;
            } else {
                report.failed += 1;
            }
        }

        drop(guard);
        info!(
            "Consumer {} stopped: {} processed, {} failed",
            self.task_type, report.processed, report.failed
        );

        report
    }

    /// Keep going while the run is live. After a stop, keep going until
    /// every producer of this type has stopped and its queue is drained.
    async fn should_keep_running(&self) -> bool {
        if !self.handle.stop_requested() && self.scheduler.is_running() {
            return true;
        }
        // Producers first: a producer reaches `Stopped` only after its last
        // enqueue, so once none is alive the queue length is final.
        self.scheduler.producers_alive_for(&self.task_type).await
            || !self.scheduler.queues().is_empty(&self.task_type).await
    }

    /// Process one task; failures are logged and never escape
    async fn handle_task(&self, task: &Task) -> bool {
        info!("Processing {} task: {}", self.task_type, task.url());
        let timer = self.metrics.as_ref().map(MetricsCollector::start_timer);

        let outcome = AssertUnwindSafe(self.processor.process(task.url()))
            .catch_unwind()
            .await;

        let failure_kind = match outcome {
            Ok(Ok(article)) => {
                info!("Crawled {} successfully: {}", task.url(), article.title);
                None
            }
            Ok(Err(e)) => {
                error!("Failed to process {}: {}", task.url(), e);
                Some(e.kind())
            }
            Err(_) => {
                warn!("Processor panicked on {}, skipping it", task.url());
                Some("panic")
            }
        };

        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            metrics.record_task(task.url(), timer.end(), failure_kind).await;
        }

        failure_kind.is_none()
    }
}
