use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Per-task outcome collector shared by all consumers of a run
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// In-memory metrics store
    metrics: Arc<Mutex<Metrics>>,
}

/// Metrics data structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Start time of the metrics collection
    pub start_time: DateTime<Utc>,

    /// Tasks handed to a processor
    pub total_tasks: usize,

    /// Tasks that produced an article
    pub successful_tasks: usize,

    /// Tasks that failed
    pub failed_tasks: usize,

    /// Processing durations (URL -> duration in milliseconds)
    pub task_durations: HashMap<String, u64>,

    /// Failure counts by error kind ("fetch", "parse", ...)
    pub failures_by_kind: HashMap<String, usize>,

    /// Tasks finished per minute
    pub crawl_rate: Vec<(DateTime<Utc>, usize)>,
}

impl Metrics {
    /// Mean processing time in milliseconds, if any task finished
    pub fn average_duration_ms(&self) -> Option<u64> {
        if self.task_durations.is_empty() {
            return None;
        }
        let total: u64 = self.task_durations.values().sum();
        Some(total / self.task_durations.len() as u64)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let metrics = Metrics {
            start_time: Utc::now(),
            ..Default::default()
        };

        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    /// Record the outcome of one task; `failure_kind` is `None` on success
    pub async fn record_task(&self, url: &str, duration_ms: u64, failure_kind: Option<&str>) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_tasks += 1;

        match failure_kind {
            None => metrics.successful_tasks += 1,
            Some(kind) => {
                metrics.failed_tasks += 1;
                *metrics.failures_by_kind.entry(kind.to_string()).or_default() += 1;
            }
        }

        metrics.task_durations.insert(url.to_string(), duration_ms);

        let now = Utc::now();
        let same_minute = metrics.crawl_rate.last()
            .map_or(false, |(last_time, _)| (now - *last_time).num_seconds() < 60);

        if same_minute {
            if let Some((_, count)) = metrics.crawl_rate.last_mut() {
                *count += 1;
            }
        } else {
            metrics.crawl_rate.push((now, 1));
        }
    }

    /// Start timing a task
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get all metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

/// Timer for measuring task durations
pub struct RequestTimer {
    /// Start time of the task
    start: Instant,
}

impl RequestTimer {
    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
