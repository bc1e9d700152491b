//! Recognition directory: contributor id → nodes instantiating it.
//!
//! Owned by exactly one `WeightedTree` (the hierarchy root). Entries are
//! maintained incrementally by the tree's mutation methods; nothing outside
//! the tree mutates it.

use std::collections::{BTreeSet, HashMap};

use super::models::{ContributorId, NodeId};

#[derive(Debug, Clone, Default)]
pub struct RecognitionDirectory {
    entries: HashMap<ContributorId, BTreeSet<NodeId>>,
}

impl RecognitionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` as an instance of `contributor`. Returns true if newly added.
    pub(crate) fn register(&mut self, contributor: &str, node: &str) -> bool {
        self.entries
            .entry(contributor.to_string())
            .or_default()
            .insert(node.to_string())
    }

    /// Remove `node` from `contributor`'s instances. Empty entries are dropped.
    pub(crate) fn unregister(&mut self, contributor: &str, node: &str) -> bool {
        let Some(set) = self.entries.get_mut(contributor) else {
            return false;
        };
        let removed = set.remove(node);
        if set.is_empty() {
            self.entries.remove(contributor);
        }
        removed
    }

    /// Node ids instantiating `contributor` (empty if none).
    pub fn instances_of(&self, contributor: &str) -> BTreeSet<NodeId> {
        self.entries.get(contributor).cloned().unwrap_or_default()
    }

    pub fn has_instances(&self, contributor: &str) -> bool {
        self.entries.contains_key(contributor)
    }

    /// Every contributor with at least one instance, sorted.
    pub fn contributors(&self) -> Vec<ContributorId> {
        let mut ids: Vec<ContributorId> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let mut dir = RecognitionDirectory::new();
        assert!(dir.register("bob", "n1"));
        assert!(!dir.register("bob", "n1"));
        assert!(dir.register("bob", "n2"));
        assert!(dir.register("carol", "n2"));

        assert_eq!(dir.instances_of("bob").len(), 2);
        assert_eq!(dir.contributors(), vec!["bob".to_string(), "carol".to_string()]);

        assert!(dir.unregister("bob", "n1"));
        assert!(!dir.unregister("bob", "n1"));
        assert!(dir.unregister("bob", "n2"));
        assert!(!dir.has_instances("bob"));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_unknown_contributor_is_empty() {
        let dir = RecognitionDirectory::new();
        assert!(dir.instances_of("nobody").is_empty());
        assert!(dir.is_empty());
    }
}
