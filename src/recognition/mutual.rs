//! One-directional and mutual recognition.
//!
//! `shareOfGeneralFulfillment(root, c)` attributes to contributor `c` the
//! fulfilled weight of every node instantiating it. An instance that declares
//! several contributors splits its weight evenly between them.
//!
//! Mutual recognition between two peers is the minimum of the two
//! one-directional shares: neither side can inflate the relationship alone.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::shares::{normalize, ShareMap};
use crate::error::RecognitionError;
use crate::tree::{fulfilled, WeightedTree};

/// Source of the share each peer reports toward this hierarchy's root.
pub trait ReciprocalShares {
    /// Most recent share `peer` attributes to us; 0 when unknown.
    fn reciprocal_share(&self, peer: &str) -> f64;
}

impl ReciprocalShares for HashMap<String, f64> {
    fn reciprocal_share(&self, peer: &str) -> f64 {
        self.get(peer).copied().unwrap_or(0.0)
    }
}

impl ReciprocalShares for BTreeMap<String, f64> {
    fn reciprocal_share(&self, peer: &str) -> f64 {
        self.get(peer).copied().unwrap_or(0.0)
    }
}

/// One-directional recognition of `contributor` by the hierarchy rooted at `tree`.
pub fn share_of_general_fulfillment(tree: &WeightedTree, contributor: &str) -> f64 {
    let mut share = 0.0;
    for instance_id in tree.directory().instances_of(contributor) {
        let Some(instance) = tree.get(&instance_id) else {
            let err = RecognitionError::UnresolvedReference(format!(
                "directory entry {contributor} -> {instance_id}"
            ));
            warn!(root = %tree.root_id(), error = %err, "Skipping instance");
            continue;
        };
        let declared = instance.contributors.len().max(1) as f64;
        share += fulfilled(tree, &instance_id) * tree.weight(&instance_id) / declared;
    }
    share
}

/// `shareOfGeneralFulfillment` for every contributor that has an instance.
pub fn recognition_map(tree: &WeightedTree) -> ShareMap {
    tree.directory()
        .contributors()
        .into_iter()
        .map(|c| {
            let share = share_of_general_fulfillment(tree, &c);
            (c, share)
        })
        .collect()
}

/// `min(our share toward peer, peer's share toward us)`.
pub fn mutual_fulfillment(tree: &WeightedTree, peer: &str, reciprocal: f64) -> f64 {
    share_of_general_fulfillment(tree, peer).min(reciprocal.max(0.0))
}

/// Mutual recognition toward every contributor, normalized to sum to 1 (or empty).
pub fn mutual_fulfillment_distribution(
    tree: &WeightedTree,
    reciprocal: &dyn ReciprocalShares,
) -> ShareMap {
    let raw: ShareMap = tree
        .directory()
        .contributors()
        .into_iter()
        .filter_map(|peer| {
            let value = mutual_fulfillment(tree, &peer, reciprocal.reciprocal_share(&peer));
            (value > 0.0).then_some((peer, value))
        })
        .collect();
    normalize(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::shares::total;

    const EPS: f64 = 1e-9;

    fn alice() -> WeightedTree {
        let mut tree = WeightedTree::new("alice", "Alice");
        tree.insert_child("alice", "garden", "Garden", 80.0).unwrap();
        tree.insert_child("alice", "music", "Music", 20.0).unwrap();
        tree.add_contributor("garden", "bob").unwrap();
        tree.add_contributor("music", "carol").unwrap();
        tree
    }

    #[test]
    fn test_share_of_general_fulfillment() {
        let tree = alice();
        assert!((share_of_general_fulfillment(&tree, "bob") - 0.8).abs() < EPS);
        assert!((share_of_general_fulfillment(&tree, "carol") - 0.2).abs() < EPS);
        assert_eq!(share_of_general_fulfillment(&tree, "dave"), 0.0);
    }

    #[test]
    fn test_shared_instance_splits_weight() {
        let mut tree = alice();
        tree.add_contributor("music", "bob").unwrap();
        // music (0.2) now split between bob and carol
        assert!((share_of_general_fulfillment(&tree, "bob") - 0.9).abs() < EPS);
        assert!((share_of_general_fulfillment(&tree, "carol") - 0.1).abs() < EPS);
        assert!((total(&recognition_map(&tree)) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_mutual_is_minimum_of_both_directions() {
        let tree = alice();
        // alice → bob is 0.8, bob reports 0.3 toward alice
        assert!((mutual_fulfillment(&tree, "bob", 0.3) - 0.3).abs() < EPS);
        assert!((mutual_fulfillment(&tree, "bob", 0.95) - 0.8).abs() < EPS);
        assert_eq!(mutual_fulfillment(&tree, "bob", 0.0), 0.0);
    }

    #[test]
    fn test_distribution_normalizes() {
        let tree = alice();
        let reciprocal = HashMap::from([("bob".to_string(), 0.3), ("carol".to_string(), 0.1)]);
        let dist = mutual_fulfillment_distribution(&tree, &reciprocal);
        assert!((dist["bob"] - 0.75).abs() < EPS);
        assert!((dist["carol"] - 0.25).abs() < EPS);
        assert!((total(&dist) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_distribution_empty_without_reciprocity() {
        let tree = alice();
        let dist = mutual_fulfillment_distribution(&tree, &HashMap::new());
        assert!(dist.is_empty());
    }

    #[test]
    fn test_unfulfilled_instance_contributes_nothing() {
        let mut tree = WeightedTree::new("alice", "Alice");
        tree.insert_child("alice", "plan", "Plan", 1.0).unwrap();
        tree.insert_child("plan", "idea", "Idea", 1.0).unwrap();
        tree.add_contributor("idea", "bob").unwrap();
        assert!((share_of_general_fulfillment(&tree, "bob") - 1.0).abs() < EPS);
        tree.remove_contributor("idea", "bob").unwrap();
        assert_eq!(share_of_general_fulfillment(&tree, "bob"), 0.0);
    }
}
