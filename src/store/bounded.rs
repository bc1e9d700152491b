//! Bounded-wait reads.
//!
//! Every read from the store goes through [`read_bounded`], which turns a slow
//! or unavailable remote into [`ReadOutcome::TimedOut`] instead of blocking.
//! Callers pick their own default with [`ReadOutcome::unwrap_or`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::Store;
use crate::error::RecognitionError;

/// Result of a read with a deadline.
#[derive(Debug)]
pub enum ReadOutcome<T> {
    Ok(T),
    TimedOut,
    Err(anyhow::Error),
}

impl<T> ReadOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ReadOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.ok().unwrap_or(default)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ReadOutcome::TimedOut)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadOutcome<U> {
        match self {
            ReadOutcome::Ok(v) => ReadOutcome::Ok(f(v)),
            ReadOutcome::TimedOut => ReadOutcome::TimedOut,
            ReadOutcome::Err(e) => ReadOutcome::Err(e),
        }
    }
}

/// Read `path`, giving up after `timeout`.
pub async fn read_bounded(
    store: &dyn Store,
    path: &str,
    timeout: Duration,
) -> ReadOutcome<Option<Value>> {
    match tokio::time::timeout(timeout, store.get(path)).await {
        Ok(Ok(value)) => ReadOutcome::Ok(value),
        Ok(Err(e)) => {
            warn!(path, error = %e, "Store read failed");
            ReadOutcome::Err(e)
        }
        Err(_) => {
            let err = RecognitionError::StoreTimeout {
                path: path.to_string(),
                after: timeout,
            };
            warn!(error = %err, "Degrading to default");
            ReadOutcome::TimedOut
        }
    }
}

/// Read and deserialize `path`. A value of the wrong shape reads as `None`.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn Store,
    path: &str,
    timeout: Duration,
) -> ReadOutcome<Option<T>> {
    read_bounded(store, path, timeout).await.map(|value| {
        value.and_then(|v| match serde_json::from_value(v) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!(path, error = %e, "Ignoring malformed record");
                None
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_ok() {
        let store = MemoryStore::new();
        store.put("x", json!(0.5)).await.unwrap();
        let out = read_json::<f64>(&store, "x", Duration::from_secs(1)).await;
        assert_eq!(out.unwrap_or(None), Some(0.5));
    }

    #[tokio::test]
    async fn test_malformed_reads_as_none() {
        let store = MemoryStore::new();
        store.put("x", json!("not a number")).await.unwrap();
        let out = read_json::<f64>(&store, "x", Duration::from_secs(1)).await;
        assert!(matches!(out, ReadOutcome::Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let out = read_bounded(&store, "x", Duration::from_secs(5)).await;
        assert!(out.is_timed_out());
        assert_eq!(out.unwrap_or(Some(json!(0))), Some(json!(0)));
    }
}
