//! Cancelable store subscriptions.

use std::future::Future;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::traits::StoreEvent;

/// Background listener for one store path.
///
/// Events are handed to the callback one at a time, in arrival order. The
/// listener stops on `cancel()`, when the channel closes, or when the
/// `Subscription` is dropped.
#[derive(Debug)]
pub struct Subscription {
    path: String,
    token: CancellationToken,
}

impl Subscription {
    pub fn spawn<F, Fut>(
        path: impl Into<String>,
        mut rx: broadcast::Receiver<StoreEvent>,
        mut on_change: F,
    ) -> Self
    where
        F: FnMut(StoreEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let path = path.into();
        let token = CancellationToken::new();

        let task_token = token.clone();
        let task_path = path.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => on_change(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(path = %task_path, skipped, "Subscriber lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(path = %task_path, "Subscription ended");
        });

        Self { path, token }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stop listening. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_delivers_in_order_until_cancelled() {
        let store = MemoryStore::new();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let sink = seen.clone();

        let rx = store.subscribe("p").await.unwrap();
        let sub = Subscription::spawn("p", rx, move |event| {
            let sink = sink.clone();
            async move { sink.lock().await.push(event.value) }
        });

        store.put("p", json!(1)).await.unwrap();
        store.put("p", json!(2)).await.unwrap();
        settle().await;
        assert_eq!(*seen.lock().await, vec![json!(1), json!(2)]);

        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        settle().await;
        store.put("p", json!(3)).await.unwrap();
        settle().await;
        assert_eq!(seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_stops_listener() {
        let store = MemoryStore::new();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let sink = seen.clone();

        let rx = store.subscribe("p").await.unwrap();
        let sub = Subscription::spawn("p", rx, move |event| {
            let sink = sink.clone();
            async move { sink.lock().await.push(event.value) }
        });
        assert_eq!(sub.path(), "p");
        drop(sub);
        settle().await;

        store.put("p", json!(1)).await.unwrap();
        settle().await;
        assert!(seen.lock().await.is_empty());
    }
}
