//! Trait abstraction for the replicated key-value store

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// A change delivered to subscribers of a path.
///
/// Delivery may be stale, duplicated or out of order; `Value::Null` means the
/// path was cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub path: String,
    pub value: Value,
}

/// The replicated store collaborator.
///
/// Writes are fire-and-forget from the caller's point of view and eventually
/// visible to every subscriber of the path, including the writer itself.
#[async_trait]
pub trait Store: Send + Sync {
    /// Current value at `path`, `None` when nothing was ever written.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Write `value` at `path`.
    async fn put(&self, path: &str, value: Value) -> Result<()>;

    /// Stream of future changes at `path`.
    async fn subscribe(&self, path: &str) -> Result<broadcast::Receiver<StoreEvent>>;
}
