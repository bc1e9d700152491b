//! Coalesced store writes.
//!
//! Mutations stage `(path, value)` pairs instead of writing them directly.
//! The first staged write schedules one flush after `flush_ms`; later writes to
//! the same path before that flush overwrite the staged value.
//!
//! Flushes are serialized: a flush waits for the one in progress, so a newer
//! value of a path is always written after an older one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::delay::DelayedTask;
use crate::store::Store;

struct BatcherInner {
    store: Arc<dyn Store>,
    delay: Duration,
    staged: Mutex<BTreeMap<String, Value>>,
    /// Held from taking a batch until its last write completes.
    flushing: Mutex<()>,
    timer: Mutex<Option<DelayedTask>>,
    scheduled: AtomicBool,
    shut_down: AtomicBool,
    flushes: AtomicU64,
}

/// Batches store writes into a single scheduled flush. Cheap to clone.
#[derive(Clone)]
pub struct WriteBatcher {
    inner: Arc<BatcherInner>,
}

impl WriteBatcher {
    pub fn new(store: Arc<dyn Store>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                store,
                delay,
                staged: Mutex::new(BTreeMap::new()),
                flushing: Mutex::new(()),
                timer: Mutex::new(None),
                scheduled: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Stage a write. Must be called inside a tokio runtime.
    ///
    /// After [`shutdown`](Self::shutdown) writes are still staged but only an
    /// explicit [`flush`](Self::flush) persists them.
    pub async fn stage(&self, path: impl Into<String>, value: Value) {
        let inner = &self.inner;
        inner.staged.lock().await.insert(path.into(), value);

        if inner.shut_down.load(Ordering::SeqCst) || inner.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(inner);
        let task = DelayedTask::spawn(inner.delay, async move {
            if let Some(inner) = weak.upgrade() {
                WriteBatcher { inner }.flush().await;
            }
        });
        if let Some(previous) = inner.timer.lock().await.replace(task) {
            previous.cancel();
        }
    }

    /// Write everything staged so far. Returns the number of successful writes.
    pub async fn flush(&self) -> usize {
        let _flushing = self.inner.flushing.lock().await;
        self.inner.scheduled.store(false, Ordering::SeqCst);
        let batch = std::mem::take(&mut *self.inner.staged.lock().await);
        if batch.is_empty() {
            return 0;
        }

        let total = batch.len();
        let mut written = 0;
        for (path, value) in batch {
            match self.inner.store.put(&path, value).await {
                Ok(()) => written += 1,
                Err(e) => warn!(path = %path, error = %e, "Failed to persist staged write"),
            }
        }
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(written, total, "Flushed staged writes");
        written
    }

    /// Cancel the pending flush timer and stop scheduling new ones. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(timer) = self.inner.timer.lock().await.take() {
            timer.cancel();
        }
        self.inner.scheduled.store(false, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub async fn staged_count(&self) -> usize {
        self.inner.staged.lock().await.len()
    }

    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }
}
