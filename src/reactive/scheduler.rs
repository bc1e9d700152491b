//! Debounced recompute scheduling.
//!
//! Coalesces bursts of recompute triggers per key:
//! 1. `schedule(key)` replaces any pending timer for `key`
//! 2. The timer waits `debounce_ms`, stretched so that two runs of the same
//!    key are at least `cooldown_ms` apart
//! 3. When it fires, the [`RecomputeHandler`] runs with that key
//!
//! Between `begin_startup` and `end_startup` triggers are only collected;
//! `end_startup` runs them as a single batch.
//!
//! ## Usage
//!
//! ```ignore
//! let scheduler = RecomputeScheduler::new(handler, SchedulerConfig::default());
//! scheduler.schedule("shares"); // non-blocking
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::delay::DelayedTask;

/// Work run when a scheduled key fires.
#[async_trait]
pub trait RecomputeHandler: Send + Sync {
    async fn recompute(&self, keys: Vec<String>);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period before a trigger fires.
    pub debounce_ms: u64,
    /// Minimum spacing between two runs of the same key.
    pub cooldown_ms: u64,
    /// Delay before staged store writes are flushed.
    pub flush_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            cooldown_ms: 4_000,
            flush_ms: 100,
        }
    }
}

struct Inner {
    handler: Arc<dyn RecomputeHandler>,
    config: SchedulerConfig,
    pending: DashMap<String, (u64, DelayedTask)>,
    last_run: DashMap<String, Instant>,
    startup_keys: DashSet<String>,
    in_startup: AtomicBool,
    shut_down: AtomicBool,
    generation: AtomicU64,
    runs: AtomicU64,
}

impl Inner {
    fn delay_for(&self, key: &str) -> Duration {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        let cooldown_left = self
            .last_run
            .get(key)
            .map(|last| (*last + cooldown).saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);
        debounce.max(cooldown_left)
    }

    async fn run(&self, keys: Vec<String>) {
        let now = Instant::now();
        for key in &keys {
            self.last_run.insert(key.clone(), now);
        }
        self.runs.fetch_add(1, Ordering::Relaxed);

        let start = std::time::Instant::now();
        self.handler.recompute(keys.clone()).await;
        debug!(keys = ?keys, elapsed = ?start.elapsed(), "Scheduled recompute finished");
    }
}

/// Per-key debounce + cooldown scheduler. Cheap to clone.
#[derive(Clone)]
pub struct RecomputeScheduler {
    inner: Arc<Inner>,
}

impl RecomputeScheduler {
    pub fn new(handler: Arc<dyn RecomputeHandler>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                config,
                pending: DashMap::new(),
                last_run: DashMap::new(),
                startup_keys: DashSet::new(),
                in_startup: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                runs: AtomicU64::new(0),
            }),
        }
    }

    /// Request a recompute of `key`. Must be called inside a tokio runtime.
    pub fn schedule(&self, key: &str) {
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::SeqCst) {
            return;
        }
        if inner.in_startup.load(Ordering::SeqCst) {
            inner.startup_keys.insert(key.to_string());
            return;
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst);
        let delay = inner.delay_for(key);

        let entry = inner.pending.entry(key.to_string());
        if let Entry::Occupied(existing) = &entry {
            existing.get().1.cancel();
        }

        let weak = Arc::downgrade(inner);
        let fire_key = key.to_string();
        let task = DelayedTask::spawn(delay, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let current = inner
                .pending
                .remove_if(&fire_key, |_, (g, _)| *g == generation);
            if current.is_some() {
                inner.run(vec![fire_key]).await;
            }
        });
        drop(entry.insert((generation, task)));

        debug!(key, delay_ms = delay.as_millis() as u64, "Recompute scheduled");
    }

    /// Start collecting triggers instead of timing them.
    pub fn begin_startup(&self) {
        self.inner.in_startup.store(true, Ordering::SeqCst);
    }

    /// Leave the startup phase and run every collected key as one batch.
    ///
    /// Returns the number of keys in the batch.
    pub async fn end_startup(&self) -> usize {
        let inner = &self.inner;
        inner.in_startup.store(false, Ordering::SeqCst);

        let mut keys: Vec<String> = inner.startup_keys.iter().map(|k| k.clone()).collect();
        inner.startup_keys.clear();
        keys.sort();

        let count = keys.len();
        if count > 0 && !inner.shut_down.load(Ordering::SeqCst) {
            info!(keys = count, "Running startup recompute batch");
            inner.run(keys).await;
        }
        count
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn is_in_startup(&self) -> bool {
        self.inner.in_startup.load(Ordering::SeqCst)
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) {
        for entry in self.inner.pending.iter() {
            entry.value().1.cancel();
        }
        self.inner.pending.clear();
    }

    /// Cancel pending work and ignore further triggers. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            self.cancel_all();
            self.inner.startup_keys.clear();
            info!("Recompute scheduler shut down");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of handler invocations so far.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::Relaxed)
    }

    /// Weak handle for callers that must not keep the scheduler alive.
    pub fn downgrade(&self) -> RecomputeTrigger {
        RecomputeTrigger {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak trigger handle held by reactive observers.
#[derive(Clone)]
pub struct RecomputeTrigger {
    inner: Weak<Inner>,
}

impl RecomputeTrigger {
    /// Schedule `key` if the scheduler is still alive.
    pub fn schedule(&self, key: &str) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                RecomputeScheduler { inner }.schedule(key);
                true
            }
            None => false,
        }
    }
}
