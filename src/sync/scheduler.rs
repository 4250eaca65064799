//! Tick scheduling
//!
//! The sampler only ever asks for "run this after that long". Production
//! uses the tokio timer; tests drive a manual clock.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::error;

/// A unit of deferred work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Scheduler backed by the tokio timer.
///
/// Tasks run on the blocking pool, so a slow frame capture holds a blocking
/// thread and never the runtime. Two tasks may run at the same time if one
/// outlives its successor's delay.
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime we are currently inside
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().context("Tick scheduler needs a tokio runtime")?;
        Ok(Self::new(handle))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                error!("Scheduled task failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
pub use manual::ManualScheduler;


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_manual_scheduler_fires_in_due_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (delay, label) in [(30, "c"), (10, "a"), (20, "b"), (10, "a2")] {
            let order = order.clone();
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || order.lock().unwrap().push(label)),
            );
        }

        assert_eq!(scheduler.advance(Duration::from_millis(15)), 2);
        assert_eq!(*order.lock().unwrap(), vec!["a", "a2"]);
        assert_eq!(scheduler.advance(Duration::from_millis(15)), 2);
        assert_eq!(*order.lock().unwrap(), vec!["a", "a2", "b", "c"]);
        assert_eq!(scheduler.now(), Duration::from_millis(30));
    }

    #[test]
    fn test_manual_scheduler_runs_rescheduled_tasks() {
        fn repeat(scheduler: Arc<ManualScheduler>, hits: Arc<AtomicUsize>) {
            hits.fetch_add(1, Ordering::SeqCst);
            let next = scheduler.clone();
            scheduler.schedule(
                Duration::from_millis(100),
                Box::new(move || repeat(next, hits)),
            );
        }

        let scheduler = Arc::new(ManualScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let (s, h) = (scheduler.clone(), hits.clone());
        scheduler.schedule(Duration::ZERO, Box::new(move || repeat(s, h)));

        scheduler.advance(Duration::from_millis(350));
        // t = 0, 100, 200, 300
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_runs_task() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                let _ = tx.send(42);
            }),
        );
        assert_eq!(rx.await.unwrap(), 42);
    }
}
