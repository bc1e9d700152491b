//! In-memory Store for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use super::traits::{Store, StoreEvent};

const CHANNEL_CAPACITY: usize = 256;

/// In-memory implementation of [`Store`].
///
/// Values live in a `HashMap` behind an async `RwLock`; every path gets its own
/// broadcast channel, created lazily on first subscribe. `with_latency` delays
/// every read and write, and `set_offline(true)` makes reads hang forever so
/// callers exercise their timeout path.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
    channels: DashMap<String, broadcast::Sender<StoreEvent>>,
    latency: Duration,
    offline: AtomicBool,
    puts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            channels: DashMap::new(),
            latency: Duration::ZERO,
            offline: AtomicBool::new(false),
            puts: AtomicU64::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Paths currently holding a non-null value, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let data = self.data.read().await;
        let mut paths: Vec<_> = data
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.clone())
            .collect();
        paths.sort();
        paths
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        if self.offline.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.simulate_latency().await;
        let data = self.data.read().await;
        Ok(data.get(path).filter(|v| !v.is_null()).cloned())
    }

    async fn put(&self, path: &str, value: Value) -> Result<()> {
        self.simulate_latency().await;
        self.data
            .write()
            .await
            .insert(path.to_string(), value.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);

        if let Some(tx) = self.channels.get(path) {
            // No receivers is fine
            let _ = tx.send(StoreEvent {
                path: path.to_string(),
                value,
            });
        }
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<broadcast::Receiver<StoreEvent>> {
        let tx = self
            .channels
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(tx.subscribe())
    }
}
