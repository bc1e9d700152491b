//! Transitive social distribution.
//!
//! Breadth-first propagation of mutual recognition across the peer network:
//! 1. **Seed**: the root's own mutual distribution (direct peers)
//! 2. **Spreading**: level by level, each reached peer's published
//!    distribution is scaled by the path multiplier that reached it
//! 3. **Normalization**: the accumulated shares are scaled to sum to 1
//!
//! `visited` is shared by the whole traversal, so a peer first reached
//! through a weak path is not revisited when a stronger path shows up later.
//! Peers whose distribution cannot be resolved are skipped.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::TraversalConfig;
use super::shares::{normalize, ShareMap};

/// Lookup of other peers' mutual recognition distributions.
#[async_trait]
pub trait DistributionSource: Send + Sync {
    /// `peer`'s latest mutual distribution, or `None` when it is not available.
    async fn distribution(&self, peer: &str) -> Option<ShareMap>;
}

/// Result of a social distribution traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialDistribution {
    /// Normalized shares of every reached peer.
    pub shares: ShareMap,
    /// Hop count at which each peer was first reached (direct peers = 1).
    pub hops: BTreeMap<String, usize>,
    /// Peers that were reached but whose distribution could not be resolved.
    pub unresolved: Vec<String>,
}

/// Compute `root_id`'s network-wide distribution from its direct distribution.
pub async fn social_distribution(
    root_id: &str,
    direct: &ShareMap,
    source: &dyn DistributionSource,
    config: &TraversalConfig,
) -> SocialDistribution {
    let mut visited: HashSet<String> = HashSet::from([root_id.to_string()]);
    let mut result = ShareMap::new();
    let mut hops = BTreeMap::new();
    let mut unresolved = Vec::new();

    let mut frontier: Vec<(String, f64)> = Vec::new();
    for (peer, share) in direct {
        if *share < config.min_share {
            continue;
        }
        *result.entry(peer.clone()).or_insert(0.0) += share;
        hops.insert(peer.clone(), 1);
        visited.insert(peer.clone());
        frontier.push((peer.clone(), *share));
    }

    for depth in 1..=config.max_depth {
        if frontier.is_empty() {
            break;
        }

        let fetched = join_all(frontier.iter().map(|(peer, _)| source.distribution(peer))).await;

        let mut next_frontier = Vec::new();
        for ((peer, multiplier), distribution) in frontier.iter().zip(fetched) {
            let Some(distribution) = distribution else {
                debug!(root = %root_id, peer = %peer, depth, "Peer distribution unavailable, skipping");
                unresolved.push(peer.clone());
                continue;
            };

            for (next, next_share) in distribution {
                if next_share < config.min_share || visited.contains(&next) {
                    continue;
                }
                let transitive = multiplier * next_share;
                *result.entry(next.clone()).or_insert(0.0) += transitive;
                hops.insert(next.clone(), depth + 1);
                visited.insert(next.clone());
                next_frontier.push((next, transitive));
            }
        }

        debug!(
            root = %root_id,
            depth,
            reached = next_frontier.len(),
            "Social traversal level done"
        );
        frontier = next_frontier;
    }

    let shares = if result.is_empty() {
        normalize(direct)
    } else {
        normalize(&result)
    };

    SocialDistribution {
        shares,
        hops,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::shares::total;
    use std::collections::HashMap;

    const EPS: f64 = 1e-9;

    struct StaticSource(HashMap<String, ShareMap>);

    #[async_trait]
    impl DistributionSource for StaticSource {
        async fn distribution(&self, peer: &str) -> Option<ShareMap> {
            self.0.get(peer).cloned()
        }
    }

    fn shares(entries: &[(&str, f64)]) -> ShareMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn chain() -> (ShareMap, StaticSource) {
        // A → B 0.6, A → D 0.4; B → C 0.5, B → A 0.5; C → E 1.0
        let direct = shares(&[("b", 0.6), ("d", 0.4)]);
        let source = StaticSource(HashMap::from([
            ("b".to_string(), shares(&[("c", 0.5), ("a", 0.5)])),
            ("d".to_string(), shares(&[("b", 1.0)])),
            ("c".to_string(), shares(&[("e", 1.0)])),
        ]));
        (direct, source)
    }

    #[tokio::test]
    async fn test_depth_zero_matches_direct_distribution() {
        let (direct, source) = chain();
        let social = social_distribution("a", &direct, &source, &TraversalConfig::with_depth(0)).await;
        assert_eq!(social.shares, normalize(&direct));
    }

    #[tokio::test]
    async fn test_transitive_share_is_path_product() {
        let (direct, source) = chain();
        let social = social_distribution("a", &direct, &source, &TraversalConfig::with_depth(2)).await;

        // Pre-normalization: b 0.6, d 0.4, c 0.6*0.5 = 0.3, e 0.3*1.0 = 0.3
        let sum = 0.6 + 0.4 + 0.3 + 0.3;
        assert!((social.shares["c"] - 0.3 / sum).abs() < EPS);
        assert!((social.shares["e"] - 0.3 / sum).abs() < EPS);
        assert!((social.shares["b"] - 0.6 / sum).abs() < EPS);
        assert_eq!(social.hops["c"], 2);
        assert_eq!(social.hops["e"], 3);
        // the root itself is never part of its own distribution
        assert!(!social.shares.contains_key("a"));
        assert!((total(&social.shares) - 1.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_max_depth_respected() {
        let (direct, source) = chain();
        let social = social_distribution("a", &direct, &source, &TraversalConfig::with_depth(1)).await;
        assert!(social.shares.contains_key("c"));
        assert!(!social.shares.contains_key("e"));
    }

    #[tokio::test]
    async fn test_visited_peer_not_reexamined() {
        let (direct, source) = chain();
        let social = social_distribution("a", &direct, &source, &TraversalConfig::with_depth(3)).await;
        // d → b is ignored since b was already reached directly
        let sum = 0.6 + 0.4 + 0.3 + 0.3;
        assert!((social.shares["b"] - 0.6 / sum).abs() < EPS);
    }

    #[tokio::test]
    async fn test_unresolved_peers_skipped() {
        let direct = shares(&[("b", 0.5), ("ghost", 0.5)]);
        let source = StaticSource(HashMap::from([(
            "b".to_string(),
            shares(&[("c", 1.0)]),
        )]));
        let social = social_distribution("a", &direct, &source, &TraversalConfig::default()).await;

        assert!(social.unresolved.contains(&"ghost".to_string()));
        assert!(social.shares.contains_key("ghost"));
        assert!((social.shares["c"] - 0.5 / 1.5).abs() < EPS);
    }

    #[tokio::test]
    async fn test_tiny_shares_ignored() {
        let direct = shares(&[("b", 1.0)]);
        let source = StaticSource(HashMap::from([(
            "b".to_string(),
            shares(&[("c", 0.99995), ("dust", 0.00005)]),
        )]));
        let social = social_distribution("a", &direct, &source, &TraversalConfig::default()).await;
        assert!(!social.shares.contains_key("dust"));
    }

    #[tokio::test]
    async fn test_empty_direct_distribution() {
        let source = StaticSource(HashMap::new());
        let social =
            social_distribution("a", &ShareMap::new(), &source, &TraversalConfig::default()).await;
        assert!(social.shares.is_empty());
        assert!(social.hops.is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_direct_when_all_below_threshold() {
        let direct = shares(&[("b", 0.00002), ("c", 0.00006)]);
        let source = StaticSource(HashMap::new());
        let social = social_distribution("a", &direct, &source, &TraversalConfig::default()).await;
        assert!((social.shares["b"] - 0.25).abs() < EPS);
        assert!((social.shares["c"] - 0.75).abs() < EPS);
    }
}
