//! Deferred task execution for throttle relaxation
//!
//! Scheduled tasks are fire-and-forget: there is no cancellation handle.

use log::debug;
use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;

pub type DeferredTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs a task once after a delay
pub trait DeferredScheduler: Send + Sync + Debug {
    fn schedule(&self, delay: Duration, task: DeferredTask);
}

/// Schedules onto a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context, if there is one
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl DeferredScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: DeferredTask) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

/// Spawns a short-lived OS thread per task, for callers without a runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl DeferredScheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: DeferredTask) {
        let spawned = std::thread::Builder::new()
            .name("throttle-relax".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                task();
            });
        if let Err(e) = spawned {
            debug!("Failed to spawn throttle relaxation thread: {}", e);
        }
    }
}

/// Queues tasks until the caller runs them explicitly
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, DeferredTask)>>,
}

impl Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Delays of the queued tasks, in issuance order
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }

    /// Run every queued task in issuance order, returning how many ran
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<_> = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let count = tasks.len();
        for (_, task) in tasks {
            task();
        }
        count
    }
}

impl DeferredScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: DeferredTask) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((delay, task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_manual_scheduler_runs_in_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            scheduler.schedule(Duration::from_secs(1), Box::new(move || log.lock().unwrap().push(i)));
        }

        assert_eq!(scheduler.pending_count(), 3);
        assert_eq!(scheduler.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(scheduler.run_pending(), 0);
    }

    #[test]
    fn test_thread_scheduler_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&fired);
        ThreadScheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&fired);
        let scheduler = TokioScheduler::current().unwrap();
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
