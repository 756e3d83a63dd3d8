//! One-shot delayed tasks

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A task that runs once after a delay and can be cancelled before it fires.
///
/// The generation stamp lets the owner tell a live timer from one that was
/// replaced after it had already started waking up.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
    generation: u64,
}

impl ScheduledTask {
    /// Spawn `task` to run after `delay` on the current runtime.
    ///
    /// Returns `None` when called outside a tokio runtime.
    pub fn spawn<F, Fut>(delay: Duration, generation: u64, task: F) -> Option<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().ok()?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        });
        Some(Self { handle, generation })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task if it has not completed
    pub fn cancel(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let task = ScheduledTask::spawn(Duration::from_millis(100), 7, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(task.generation(), 7);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let task = ScheduledTask::spawn(Duration::from_millis(100), 1, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        task.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_runtime_returns_none() {
        let task = ScheduledTask::spawn(Duration::from_millis(1), 1, || async {});
        assert!(task.is_none());
    }
}
