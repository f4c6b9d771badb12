//! Simulated background job that reports progress through status messages.
//!
//! The job runs on its own task with the target session bound as the
//! ambient session, so its steps enqueue status text without passing the
//! session id around. Only one job runs at a time, process-wide.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chatwire_core::{SessionId, StatusChannel, spawn_in_session};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Number of "Processing step" messages.
pub const STEPS: u32 = 5;

/// Single-flight background job.
pub struct SimulatedWork {
    busy: Arc<AtomicBool>,
    status: StatusChannel,
    step_delay: Duration,
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SimulatedWork {
    /// Create an idle job runner.
    pub fn new(status: StatusChannel, step_delay: Duration) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            status,
            step_delay,
        }
    }

    /// Whether a job is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start a job for `session_id` that stops early when `cancel` fires.
    /// Returns `None` if one is already running.
    pub fn try_start(&self, session_id: SessionId, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let guard = BusyGuard(Arc::clone(&self.busy));
        let status = self.status.clone();
        let delay = self.step_delay;
        info!(session_id = %session_id, "simulated work started");
        Some(spawn_in_session(session_id, async move {
            let _guard = guard;
            tokio::select! {
                () = run_steps(&status, delay) => {}
                () = cancel.cancelled() => info!("simulated work cancelled"),
            }
        }))
    }
}

async fn run_steps(status: &StatusChannel, delay: Duration) {
    let _ = status.enqueue("Starting simulated work...", None);
    tokio::time::sleep(delay).await;
    for step in 1..=STEPS {
        let _ = status.enqueue(format!("Processing step {step} of {STEPS}..."), None);
        tokio::time::sleep(delay).await;
    }
    let _ = status.enqueue("Simulated work completed!", None);
    tokio::time::sleep(delay / 2).await;
    let _ = status.enqueue("Ready for new work or displaying results.", None);
    info!("simulated work finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_scripted_steps_for_session() {
        let status = StatusChannel::new(100);
        let work = SimulatedWork::new(status.clone(), Duration::from_millis(1500));
        let job = work.try_start("abc".into(), CancellationToken::new()).unwrap();
        assert!(work.is_busy());
        job.await.unwrap();
        assert!(!work.is_busy());

        let texts: Vec<String> = status.recent(Some("abc")).into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 8);
        assert_eq!(texts[0], "Starting simulated work...");
        assert_eq!(texts[1], "Processing step 1 of 5...");
        assert_eq!(texts[5], "Processing step 5 of 5...");
        assert_eq!(texts[6], "Simulated work completed!");
        assert_eq!(texts[7], "Ready for new work or displaying results.");
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_busy() {
        let work = SimulatedWork::new(StatusChannel::new(0), Duration::from_secs(1));
        let job = work.try_start("a".into(), CancellationToken::new()).unwrap();
        assert!(work.try_start("b".into(), CancellationToken::new()).is_none());
        job.await.unwrap();
        assert!(work.try_start("b".into(), CancellationToken::new()).is_some());
    }

    #[tokio::test]
    async fn aborted_job_releases_busy_flag() {
        let work = SimulatedWork::new(StatusChannel::new(0), Duration::from_secs(3600));
        let job = work.try_start("a".into(), CancellationToken::new()).unwrap();
        job.abort();
        let _ = job.await;
        assert!(!work.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_job_early() {
        let status = StatusChannel::new(100);
        let work = SimulatedWork::new(status.clone(), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let job = work.try_start("abc".into(), cancel.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        job.await.unwrap();
        assert!(!work.is_busy());
        let texts: Vec<String> = status.recent(Some("abc")).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["Starting simulated work..."]);
    }
}
