use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::crawler::scheduler::Scheduler;
use crate::crawler::source::UrlSource;
use crate::crawler::task::Task;
use crate::crawler::worker::{WorkerHandle, WorkerRole, WorkerState};

/// Outcome of one producer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub task_type: String,

    /// URLs accepted by the queue
    pub emitted: usize,

    /// URLs rejected as already visited
    pub duplicates: usize,
}

/// Pulls URLs from a source and pushes them into the queue of one task type
pub struct Producer<S> {
    scheduler: Arc<Scheduler>,
    task_type: String,
    source: S,
    handle: WorkerHandle,
    delay_ms: (u64, u64),
}

impl<S: UrlSource + 'static> Producer<S> {
    /// Create a producer and register it (and its task type) with the scheduler
    pub async fn new(scheduler: Arc<Scheduler>, task_type: impl Into<String>, source: S) -> Self {
        let task_type = task_type.into();
        let handle = WorkerHandle::new(WorkerRole::Producer, task_type.clone());
        scheduler.register_producer(handle.clone()).await;

        Self {
            scheduler,
            task_type,
            source,
            handle,
            delay_ms: (0, 0),
        }
    }

    /// Sleep a random number of milliseconds in `[min_ms, max_ms]` after each push
    pub fn with_delay(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.delay_ms = (min_ms, max_ms.max(min_ms));
        self
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Run the producer loop on its own task
    pub fn start(self) -> JoinHandle<ProducerReport> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> ProducerReport {
        let mut report = ProducerReport {
            task_type: self.task_type.clone(),
            ..Default::default()
        };

        let guard = self.handle.stop_guard();
        self.handle.advance(WorkerState::Running);
        info!("Producer {} started", self.task_type);

        while !self.handle.stop_requested() && self.scheduler.is_running() {
            let Some(url) = self.source.next_url() else {
                debug!("Producer {} exhausted its source", self.task_type);
                break;
            };

            match self.scheduler.queues().enqueue(Task::new(url.as_str(), self.task_type.as_str())).await {
                Ok(true) => {
                    report.emitted += 1;
                    info!("Generated URL: {}", url);
                }
                Ok(false) => {
                    report.duplicates += 1;
                    debug!("Producer {} skipped duplicate URL: {}", self.task_type, url);
                }
                Err(e) => {
                    error!("Producer {} cannot enqueue {}: {}", self.task_type, url, e);
                    break;
                }
            }

            if self.source.is_exhausted() {
                break;
            }

            tokio::time::sleep(self.next_delay()).await;
        }

        drop(guard);
        info!("Producer {} stopped after emitting {} URL(s)", self.task_type, report.emitted);

        report
    }

    fn next_delay(&self) -> Duration {
        let (min, max) = self.delay_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(thread_rng().gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::SchedulerSettings;
    use crate::crawler::source::StaticUrlSource;
    use crate::storage::queue::DedupPolicy;

    fn create_scheduler(dedup: DedupPolicy) -> Arc<Scheduler> {
        Scheduler::new(&SchedulerSettings {
            tick_interval_ms: 100,
            dequeue_timeout_ms: 50,
            dedup,
        })
    }

    #[tokio::test]
    async fn test_producer_pushes_in_order_then_stops() {
        let scheduler = create_scheduler(DedupPolicy::OnEnqueue);
        let producer = Producer::new(scheduler.clone(), "A", StaticUrlSource::new(["a", "b", "c"])).await;
        let handle = producer.handle();
        assert_eq!(handle.state(), WorkerState::Created);

        let report = producer.start().await.unwrap();
        assert_eq!(report.emitted, 3);
        assert_eq!(handle.state(), WorkerState::Stopped);

        let queues = scheduler.queues();
        for expected in ["a", "b", "c"] {
            let task = queues.dequeue("A", Duration::from_millis(10)).await.unwrap().unwrap();
            assert_eq!(task.url(), expected);
        }
    }

    #[tokio::test]
    async fn test_producer_stops_right_after_last_emission() {
        let scheduler = create_scheduler(DedupPolicy::OnEnqueue);
        let producer = Producer::new(scheduler.clone(), "A", StaticUrlSource::new(["a"]))
            .await
            .with_delay(5_000, 5_000);

        let report = tokio::time::timeout(Duration::from_secs(1), producer.start())
            .await
            .expect("producer slept after its final URL")
            .unwrap();
        assert_eq!(report.emitted, 1);
    }

    #[tokio::test]
    async fn test_producer_honours_stop_request() {
        let scheduler = create_scheduler(DedupPolicy::OnEnqueue);
        let urls: Vec<String> = (0..100).map(|i| format!("u{}", i)).collect();
        let producer = Producer::new(scheduler.clone(), "A", StaticUrlSource::new(urls))
            .await
            .with_delay(20, 20);
        let handle = producer.handle();

        let join = producer.start();
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(handle.request_stop());
        assert!(!handle.request_stop());

        let report = join.await.unwrap();
        assert!(report.emitted < 100);
        assert_eq!(handle.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_producer_does_not_start_after_scheduler_stop() {
        let scheduler = create_scheduler(DedupPolicy::OnEnqueue);
        let producer = Producer::new(scheduler.clone(), "A", StaticUrlSource::new(["a"])).await;
        scheduler.stop();

        let report = producer.run().await;
        assert_eq!(report.emitted, 0);
        assert!(scheduler.queues().is_empty("A").await);
    }

    #[tokio::test]
    async fn test_duplicate_urls_across_producers_enqueue_once() {
        let scheduler = create_scheduler(DedupPolicy::OnEnqueue);
        let first = Producer::new(scheduler.clone(), "A", StaticUrlSource::new(["x"])).await;
        let second = Producer::new(scheduler.clone(), "A", StaticUrlSource::new(["x"])).await;

        let (first, second) = tokio::join!(first.start(), second.start());
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.emitted + second.emitted, 1);
        assert_eq!(first.duplicates + second.duplicates, 1);
        assert_eq!(scheduler.queues().len("A").await, 1);
    }
}
