//! Peer distributions read from the store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::reactive::{QueryCache, QueryKey, QueryOp};
use crate::recognition::{DistributionSource, ShareMap};
use crate::store::records::distribution_path;
use crate::store::{read_json, PublishedShares, ReadOutcome, Store};

/// [`DistributionSource`] over the peers' published mutual distributions.
///
/// Every fetch is a bounded read; results are memoized under
/// [`QueryOp::PeerDistribution`]. Missing records, timeouts and store errors
/// all make the peer unresolved for this traversal.
pub struct StoreDistributionSource {
    store: Arc<dyn Store>,
    cache: Arc<QueryCache>,
    timeout: Duration,
}

impl StoreDistributionSource {
    pub fn new(store: Arc<dyn Store>, cache: Arc<QueryCache>, timeout: Duration) -> Self {
        Self {
            store,
            cache,
            timeout,
        }
    }
}

#[async_trait]
impl DistributionSource for StoreDistributionSource {
    async fn distribution(&self, peer: &str) -> Option<ShareMap> {
        let key = QueryKey::new(peer, QueryOp::PeerDistribution, "");
        if let Some(cached) = self.cache.shares(&key) {
            return Some((*cached).clone());
        }

        let path = distribution_path(peer);
        match read_json::<PublishedShares>(self.store.as_ref(), &path, self.timeout).await {
            ReadOutcome::Ok(Some(published)) => {
                self.cache.insert_shares(key, published.shares.clone());
                Some(published.shares)
            }
            ReadOutcome::Ok(None) => {
                debug!(peer, "No published distribution");
                None
            }
            ReadOutcome::TimedOut | ReadOutcome::Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn published(entries: &[(&str, f64)]) -> serde_json::Value {
        let shares = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        serde_json::to_value(PublishedShares::new(1, shares)).unwrap()
    }

    #[tokio::test]
    async fn test_reads_and_memoizes() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&distribution_path("bob"), published(&[("carol", 1.0)]))
            .await
            .unwrap();
        let cache = Arc::new(QueryCache::default());
        let source = StoreDistributionSource::new(store.clone(), cache.clone(), Duration::from_secs(1));

        let first = source.distribution("bob").await.unwrap();
        assert_eq!(first["carol"], 1.0);

        // a newer record is not seen inside the staleness window
        store
            .put(&distribution_path("bob"), published(&[("dave", 1.0)]))
            .await
            .unwrap();
        let second = source.distribution("bob").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(cache.hits(), 1);

        assert!(source.distribution("nobody").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_peer_is_unresolved() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let source = StoreDistributionSource::new(
            store,
            Arc::new(QueryCache::default()),
            Duration::from_secs(5),
        );
        assert!(source.distribution("bob").await.is_none());
    }
}
