use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Lifecycle of a producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Created => "created",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Which side of the pipeline a worker is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Producer,
    Consumer,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::Producer => f.write_str("Producer"),
            WorkerRole::Consumer => f.write_str("Consumer"),
        }
    }
}

#[derive(Debug)]
struct Control {
    role: WorkerRole,
    task_type: String,
    state: AtomicU8,
    stop_requested: AtomicBool,
}

/// Shared handle on a worker's state and stop flag.
///
/// Cloning is cheap; the scheduler keeps one clone per registered worker to
/// judge liveness, the worker itself keeps another to drive transitions.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    inner: Arc<Control>,
}

impl WorkerHandle {
    pub fn new(role: WorkerRole, task_type: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Control {
                role,
                task_type: task_type.into(),
                state: AtomicU8::new(WorkerState::Created as u8),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn role(&self) -> WorkerRole {
        self.inner.role
    }

    pub fn task_type(&self) -> &str {
        &self.inner.task_type
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// A worker counts as alive until it reaches `Stopped`
    pub fn is_alive(&self) -> bool {
        self.state() != WorkerState::Stopped
    }

    /// Ask the worker to leave its loop at the next boundary.
    /// Returns true only for the call that actually set the flag.
    pub fn request_stop(&self) -> bool {
        !self.inner.stop_requested.swap(true, Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    /// Move forward to `next`. States never go backwards, so a late
    /// transition after `Stopped` is ignored.
    pub(crate) fn advance(&self, next: WorkerState) -> bool {
        let next = next as u8;
        let mut current = self.inner.state.load(Ordering::SeqCst);
        while current < next {
            match self.inner.state.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// Guard that moves the worker to `Stopped` when dropped, including
    /// when the worker's task unwinds from a panic.
    pub(crate) fn stop_guard(&self) -> StopGuard {
        StopGuard {
            handle: self.clone(),
        }
    }
}

pub(crate) struct StopGuard {
    handle: WorkerHandle,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.handle.advance(WorkerState::Stopping);
        self.handle.advance(WorkerState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_is_monotonic() {
        let handle = WorkerHandle::new(WorkerRole::Producer, "A");
        assert_eq!(handle.state(), WorkerState::Created);
        assert!(handle.is_alive());

        assert!(handle.advance(WorkerState::Running));
        assert!(handle.advance(WorkerState::Stopped));
        assert!(!handle.is_alive());

        // No restart
        assert!(!handle.advance(WorkerState::Running));
        assert_eq!(handle.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_request_stop_is_idempotent() {
        let handle = WorkerHandle::new(WorkerRole::Consumer, "A");
        let observer = handle.clone();

        assert!(handle.request_stop());
        assert!(!handle.request_stop());
        assert!(observer.stop_requested());
        assert_eq!(observer.state(), WorkerState::Created);
    }

    #[test]
    fn test_stop_guard_stops_on_unwind() {
        let handle = WorkerHandle::new(WorkerRole::Producer, "A");
        handle.advance(WorkerState::Running);

        let worker = handle.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = worker.stop_guard();
            panic!("source failed");
        });

        assert!(result.is_err());
        assert_eq!(handle.state(), WorkerState::Stopped);
        assert!(!handle.is_alive());
    }
}
