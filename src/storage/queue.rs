use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::crawler::task::Task;

/// When a URL is recorded in the visited set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Record on enqueue; a visited URL is never queued twice
    #[default]
    OnEnqueue,

    /// Record when a consumer claims the task; duplicates are queued but discarded on claim
    OnDequeue,
}

/// Registry-level errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task type '{0}' has not been registered")]
    UnregisteredTaskType(String),
}

/// FIFO for one task type plus the signal its waiters park on
struct TypedQueue {
    tasks: VecDeque<Task>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Registry {
    queues: HashMap<String, TypedQueue>,
    visited: HashSet<String>,
}

/// In-memory per-task-type work queues with a shared visited set
///
/// One physical queue exists per task type, so a consumer never sees a task
/// of another type. The queue map and the visited set sit behind one lock,
/// which keeps the visited check and the queue mutation atomic together.
pub struct TaskQueues {
    policy: DedupPolicy,
    inner: Mutex<Registry>,
}

impl TaskQueues {
    /// Create an empty registry using the given dedup policy
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Registry::default()),
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Create the queue for a task type if it does not exist yet.
    /// Returns true when a new queue was created.
    pub async fn register_task_type(&self, task_type: &str) -> bool {
        let mut registry = self.inner.lock().await;
        if registry.queues.contains_key(task_type) {
            return false;
        }

        registry.queues.insert(task_type.to_string(), TypedQueue {
            tasks: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        });
        debug!("Registered task type: {}", task_type);
        true
    }

    /// Append a task to the queue of its type.
    /// Returns false when the task was dropped as a duplicate.
    pub async fn enqueue(&self, task: Task) -> Result<bool, QueueError> {
        let mut guard = self.inner.lock().await;
        let registry = &mut *guard;

        let queue = registry.queues.get_mut(task.task_type())
            .ok_or_else(|| QueueError::UnregisteredTaskType(task.task_type().to_string()))?;

        if self.policy == DedupPolicy::OnEnqueue && !registry.visited.insert(task.url().to_string()) {
            debug!("Skipping already visited URL: {}", task.url());
            return Ok(false);
        }

        debug!("Pushed task to queue {}: {}", task.task_type(), task.url());
        queue.tasks.push_back(task);
        queue.notify.notify_waiters();

        Ok(true)
    }

    /// Wait up to `timeout` for a task of the given type.
    /// Returns `Ok(None)` when nothing arrived in time.
    pub async fn dequeue(&self, task_type: &str, timeout: Duration) -> Result<Option<Task>, QueueError> {
        let deadline = Instant::now() + timeout;

        let notify = {
            let registry = self.inner.lock().await;
            registry.queues.get(task_type)
                .map(|queue| Arc::clone(&queue.notify))
                .ok_or_else(|| QueueError::UnregisteredTaskType(task_type.to_string()))?
        };

        loop {
            // Register interest before looking, so an enqueue between the
            // check and the wait still wakes us.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_claim(task_type).await {
                return Ok(Some(task));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_claim(task_type).await);
            }
        }
    }

    /// Pop the next claimable task, applying dequeue-time dedup if configured
    async fn try_claim(&self, task_type: &str) -> Option<Task> {
        let mut guard = self.inner.lock().await;
        let registry = &mut *guard;
        let queue = registry.queues.get_mut(task_type)?;

        while let Some(task) = queue.tasks.pop_front() {
            if self.policy == DedupPolicy::OnDequeue && !registry.visited.insert(task.url().to_string()) {
                debug!("Discarding already claimed URL: {}", task.url());
                continue;
            }

            debug!("Popped task from queue {}: {}", task_type, task.url());
            return Some(task);
        }

        None
    }

    /// Number of queued tasks for a type (0 for unknown types)
    pub async fn len(&self, task_type: &str) -> usize {
        let registry = self.inner.lock().await;
        registry.queues.get(task_type).map_or(0, |queue| queue.tasks.len())
    }

    pub async fn is_empty(&self, task_type: &str) -> bool {
        self.len(task_type).await == 0
    }

    /// True when every registered queue is empty
    pub async fn all_empty(&self) -> bool {
        let registry = self.inner.lock().await;
        registry.queues.values().all(|queue| queue.tasks.is_empty())
    }

    pub async fn is_visited(&self, url: &str) -> bool {
        self.inner.lock().await.visited.contains(url)
    }

    pub async fn visited_count(&self) -> usize {
        self.inner.lock().await.visited.len()
    }

    /// Registered task types, sorted
    pub async fn task_types(&self) -> Vec<String> {
        let registry = self.inner.lock().await;
        let mut types: Vec<String> = registry.queues.keys().cloned().collect();
        types.sort();
        types
    }
}
