//! Graceful shutdown of background tasks.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the process-wide shutdown token and the background tasks that
/// listen to it.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for `handle` during [`graceful_shutdown`](Self::graceful_shutdown).
    /// Handles of tasks that already finished are dropped.
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Number of tracked tasks.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for every tracked task.
    /// Stragglers are aborted. Returns whether all tasks finished in time.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let mut handles = std::mem::take(&mut *self.tasks.lock());
        info!(task_count = handles.len(), timeout_ms = timeout.as_millis(), "waiting for tasks to complete");

        let joined = tokio::time::timeout(timeout, futures::future::join_all(handles.iter_mut())).await;
        if joined.is_err() {
            warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
            for handle in &handles {
                handle.abort();
            }
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_cancels_tokens() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track(tokio::spawn(async move { token.cancelled().await }));
        assert_eq!(coord.tracked(), 1);
        assert!(coord.graceful_shutdown(Duration::from_secs(1)).await);
        assert_eq!(coord.tracked(), 0);
    }

    #[tokio::test]
    async fn finished_tasks_are_pruned() {
        let coord = ShutdownCoordinator::new();
        let done = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(done.is_finished());
        coord.track(done);
        assert_eq!(coord.tracked(), 1);
        coord.track(tokio::spawn(std::future::pending::<()>()));
        assert_eq!(coord.tracked(), 1);
        coord.track(tokio::spawn(std::future::pending::<()>()));
        assert_eq!(coord.tracked(), 2);
    }

    #[tokio::test]
    async fn graceful_shutdown_aborts_stragglers() {
        let coord = ShutdownCoordinator::new();
        coord.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));
        assert!(!coord.graceful_shutdown(Duration::from_millis(50)).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn empty_shutdown_is_clean() {
        assert!(ShutdownCoordinator::default().graceful_shutdown(Duration::from_millis(10)).await);
    }
}
