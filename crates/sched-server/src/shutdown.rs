//! Process shutdown: one token cancels every long-running task, then the
//! tasks are awaited up to a grace period.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token that long-running tasks select on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a task to be awaited during shutdown.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Cancel the token and wait for every tracked task.
    ///
    /// Tasks still running when `timeout` elapses are aborted. Returns the
    /// names of the tasks that had to be aborted.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> Vec<&'static str> {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = tasks.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to stop"
        );

        let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            info!("all tasks stopped");
            return Vec::new();
        }

        let stuck: Vec<&'static str> = names
            .into_iter()
            .zip(aborts)
            .filter(|(_, abort)| !abort.is_finished())
            .map(|(name, abort)| {
                abort.abort();
                name
            })
            .collect();
        warn!(tasks = ?stuck, "shutdown timed out after {timeout:?}, aborting");
        stuck
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
    fn token_propagates_cancel() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.token.cancel();
        assert!(token.is_cancelled());
        assert!(coord.token().is_cancelled());
    }

    #[tokio::test]
    async fn cooperative_tasks_finish() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("worker", tokio::spawn(async move { token.cancelled().await }));

        let stuck = coord.shutdown(Some(Duration::from_secs(1))).await;
        assert!(stuck.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_tasks_are_aborted() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track("polite", tokio::spawn(async move { token.cancelled().await }));
        coord.track(
            "stubborn",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }),
        );

        let stuck = coord.shutdown(Some(Duration::from_secs(5))).await;
        assert_eq!(stuck, vec!["stubborn"]);
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.shutdown(Some(Duration::from_millis(10))).await.is_empty());
        assert!(coord.shutdown(Some(Duration::from_millis(10))).await.is_empty());
        assert!(coord.token().is_cancelled());
    }
}
