//! Time-boxed query memoization.
//!
//! Uses `moka::sync::Cache` with a per-entry expiry: every query kind has its
//! own staleness window. A hit inside the window returns the stored value
//! without recomputation. Local mutations call [`QueryCache::invalidate_all`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::recognition::ShareMap;

/// Cached query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOp {
    ShareOfGeneralFulfillment,
    MutualFulfillment,
    MutualDistribution,
    SocialDistribution,
    /// Another peer's published distribution, fetched during traversal.
    PeerDistribution,
}

/// `(node, operation, args)` cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub node: String,
    pub op: QueryOp,
    pub arg: String,
}

impl QueryKey {
    pub fn new(node: impl Into<String>, op: QueryOp, arg: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            op,
            arg: arg.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Scalar(f64),
    Shares(Arc<ShareMap>),
}

/// Staleness windows per query kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub share_window_ms: u64,
    pub mutual_window_ms: u64,
    pub distribution_window_ms: u64,
    pub social_window_ms: u64,
    pub peer_window_ms: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            share_window_ms: 3_000,
            mutual_window_ms: 3_000,
            distribution_window_ms: 3_000,
            social_window_ms: 5_000,
            peer_window_ms: 5_000,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn window(&self, op: QueryOp) -> Duration {
        let ms = match op {
            QueryOp::ShareOfGeneralFulfillment => self.share_window_ms,
            QueryOp::MutualFulfillment => self.mutual_window_ms,
            QueryOp::MutualDistribution => self.distribution_window_ms,
            QueryOp::SocialDistribution => self.social_window_ms,
            QueryOp::PeerDistribution => self.peer_window_ms,
        };
        Duration::from_millis(ms)
    }
}

struct StalenessPolicy(CacheConfig);

impl Expiry<QueryKey, CachedValue> for StalenessPolicy {
    fn expire_after_create(
        &self,
        key: &QueryKey,
        _value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.0.window(key.op))
    }

    fn expire_after_update(
        &self,
        key: &QueryKey,
        _value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.0.window(key.op))
    }
}

/// Memoization cache for expensive recognition queries.
pub struct QueryCache {
    cache: Cache<QueryKey, CachedValue>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(StalenessPolicy(config.clone()))
            .build();
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        match self.cache.get(key) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: QueryKey, value: CachedValue) {
        self.cache.insert(key, value);
    }

    /// Cached scalar for `key`, computing and storing it on a miss.
    pub fn scalar(&self, key: QueryKey, compute: impl FnOnce() -> f64) -> f64 {
        if let Some(CachedValue::Scalar(v)) = self.get(&key) {
            return v;
        }
        let value = compute();
        debug!(op = ?key.op, node = %key.node, arg = %key.arg, "Query cache miss");
        self.insert(key, CachedValue::Scalar(value));
        value
    }

    /// Cached share map for `key`, if present.
    pub fn shares(&self, key: &QueryKey) -> Option<Arc<ShareMap>> {
        match self.get(key) {
            Some(CachedValue::Shares(map)) => Some(map),
            _ => None,
        }
    }

    pub fn insert_shares(&self, key: QueryKey, shares: ShareMap) -> Arc<ShareMap> {
        let shares = Arc::new(shares);
        self.insert(key, CachedValue::Shares(shares.clone()));
        shares
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Cache hit rate (0.0–1.0).
    pub fn hit_rate(&self) -> f64 {
        let h = self.hits() as f64;
        let total = h + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            h / total
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
