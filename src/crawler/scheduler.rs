use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::config::SchedulerSettings;
use crate::crawler::worker::WorkerHandle;
use crate::storage::queue::TaskQueues;

/// Supervisor for one crawl run.
///
/// Owns the task queues and the visited set, keeps a handle on every
/// registered producer and consumer, and decides when the run is over:
/// once no producer is alive and every queue is empty, `running` is flipped
/// to false. Workers poll `is_running` at their loop boundaries.
pub struct Scheduler {
    queues: TaskQueues,
    running: AtomicBool,
    tick_interval: Duration,
    dequeue_timeout: Duration,
    producers: Mutex<Vec<WorkerHandle>>,
    consumers: Mutex<Vec<WorkerHandle>>,
}

impl Scheduler {
    /// Create a new scheduler with the given settings
    pub fn new(settings: &SchedulerSettings) -> Arc<Self> {
        Arc::new(Self {
            queues: TaskQueues::new(settings.dedup),
            running: AtomicBool::new(true),
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            dequeue_timeout: Duration::from_millis(settings.dequeue_timeout_ms),
            producers: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
        })
    }

    pub fn queues(&self) -> &TaskQueues {
        &self.queues
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn dequeue_timeout(&self) -> Duration {
        self.dequeue_timeout
    }

    pub async fn register_task_type(&self, task_type: &str) {
        self.queues.register_task_type(task_type).await;
    }

    pub async fn register_producer(&self, handle: WorkerHandle) {
        self.register_task_type(handle.task_type()).await;
        debug!("Registered producer for {}", handle.task_type());
        self.producers.lock().await.push(handle);
    }

    pub async fn register_consumer(&self, handle: WorkerHandle) {
        self.register_task_type(handle.task_type()).await;
        debug!("Registered consumer for {}", handle.task_type());
        self.consumers.lock().await.push(handle);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip the running flag off. Safe to call any number of times;
    /// returns true only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            info!("Scheduler stopped");
        }
        was_running
    }

    /// Ask every registered worker to stop at its next loop boundary
    pub async fn stop_workers(&self) {
        for handle in self.producers.lock().await.iter() {
            handle.request_stop();
        }
        for handle in self.consumers.lock().await.iter() {
            handle.request_stop();
        }
    }

    /// True while any registered producer has not reached `Stopped`
    pub async fn producers_alive(&self) -> bool {
        self.producers.lock().await.iter().any(WorkerHandle::is_alive)
    }

    /// True while a producer of `task_type` has not reached `Stopped`
    pub async fn producers_alive_for(&self, task_type: &str) -> bool {
        self.producers.lock().await
            .iter()
            .any(|handle| handle.task_type() == task_type && handle.is_alive())
    }

    /// Completion rule: no producer alive and every queue empty
    pub async fn is_complete(&self) -> bool {
        !self.producers_alive().await && self.queues.all_empty().await
    }

    pub async fn producer_handles(&self) -> Vec<WorkerHandle> {
        self.producers.lock().await.clone()
    }

    pub async fn consumer_handles(&self) -> Vec<WorkerHandle> {
        self.consumers.lock().await.clone()
    }

    /// Spawn the supervisor tick loop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.supervise().await })
    }

    async fn supervise(&self) {
        info!("Scheduler started, checking completion every {:?}", self.tick_interval);

        while self.is_running() {
            tokio::time::sleep(self.tick_interval).await;

            if self.is_complete().await {
                info!("All producers finished and all queues drained");
                self.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::Task;
    use crate::crawler::worker::{WorkerRole, WorkerState};
    use crate::storage::queue::DedupPolicy;
    use tokio::time::Instant;

    fn create_test_settings(tick_interval_ms: u64) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval_ms,
            dequeue_timeout_ms: 50,
            dedup: DedupPolicy::OnEnqueue,
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = Scheduler::new(&create_test_settings(100));
        assert!(scheduler.is_running());

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_completes_without_producers() {
        let scheduler = Scheduler::new(&create_test_settings(100));
        scheduler.register_task_type("A").await;

        let started = Instant::now();
        scheduler.start().await.unwrap();

        assert!(!scheduler.is_running());
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_live_producer_blocks_completion() {
        let scheduler = Scheduler::new(&create_test_settings(50));
        let producer = WorkerHandle::new(WorkerRole::Producer, "A");
        scheduler.register_producer(producer.clone()).await;
        producer.advance(WorkerState::Running);

        let supervisor = scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.is_running());

        producer.advance(WorkerState::Stopped);
        let stopped_at = Instant::now();
        supervisor.await.unwrap();

        assert!(!scheduler.is_running());
        assert!(stopped_at.elapsed() <= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_pending_tasks_block_completion() {
        let scheduler = Scheduler::new(&create_test_settings(50));
        scheduler.register_task_type("A").await;
        scheduler.queues().enqueue(Task::new("x", "A")).await.unwrap();

        let supervisor = scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.is_running());

        scheduler.queues().dequeue("A", Duration::from_millis(10)).await.unwrap();
        let drained_at = Instant::now();
        tokio::time::timeout(Duration::from_millis(500), supervisor)
            .await
            .expect("supervisor did not notice the drained queue")
            .unwrap();
        assert!(!scheduler.is_running());
        assert!(drained_at.elapsed() <= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_stop_workers_flags_every_handle() {
        let scheduler = Scheduler::new(&create_test_settings(100));
        let producer = WorkerHandle::new(WorkerRole::Producer, "A");
        let consumer = WorkerHandle::new(WorkerRole::Consumer, "B");
        scheduler.register_producer(producer.clone()).await;
        scheduler.register_consumer(consumer.clone()).await;

        assert_eq!(scheduler.queues().task_types().await, vec!["A", "B"]);

        scheduler.stop_workers().await;
        assert!(producer.stop_requested());
        assert!(consumer.stop_requested());
    }
}
