//! Cancelable delayed task.
//!
//! A spawned tokio task that sleeps, then runs its future unless the
//! [`CancellationToken`] fired first. Replacing a pending timer is one
//! `cancel()` followed by a new `spawn`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct DelayedTask {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl DelayedTask {
    /// Run `fut` after `delay` unless cancelled in the meantime.
    pub fn spawn<F>(delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        let task_token = token.clone();
        let task_fired = fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    task_fired.store(true, Ordering::SeqCst);
                    fut.await;
                }
            }
        });

        Self { token, fired }
    }

    /// Cancel the task if it has not fired yet. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True while the delay is still running.
    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled() && !self.fired.load(Ordering::SeqCst)
    }
}
