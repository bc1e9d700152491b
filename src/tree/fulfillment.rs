//! Fulfillment and desire derivation.
//!
//! Pure functions of the current tree state:
//!
//! 1. a contribution is fully fulfilled (1.0), whatever it contains;
//! 2. any other childless node is unfulfilled (0.0);
//! 3. with a manual override and at least one contribution child, the override
//!    stands in for the contribution children and is blended with the
//!    fulfillment of the remaining children by points;
//! 4. otherwise, the share-weighted sum of the children's fulfillment.

use super::arena::WeightedTree;
use super::models::Node;

/// How much of `id`'s allocation is backed by realized contributions, in [0, 1].
pub fn fulfilled(tree: &WeightedTree, id: &str) -> f64 {
    let Some(node) = tree.get(id) else {
        return 0.0;
    };
    fulfilled_node(tree, node).clamp(0.0, 1.0)
}

/// `1 - fulfilled(id)`.
pub fn desire(tree: &WeightedTree, id: &str) -> f64 {
    1.0 - fulfilled(tree, id)
}

fn fulfilled_node(tree: &WeightedTree, node: &Node) -> f64 {
    if node.is_contribution() {
        return 1.0;
    }
    if !node.has_children() {
        return 0.0;
    }

    if let Some(manual) = node.manual_fulfillment {
        if tree.has_contribution_child(&node.id) {
            let has_other_children = tree.children(&node.id).any(|c| !c.is_contribution());
            if !has_other_children {
                return manual;
            }
            let w = contribution_children_weight(tree, &node.id);
            let f = non_contribution_children_fulfillment(tree, &node.id);
            return manual * w + f * (1.0 - w);
        }
    }

    tree.children(&node.id)
        .map(|child| fulfilled_node(tree, child) * tree.share_of_parent(&child.id))
        .sum()
}

/// Fraction of `id`'s child points held by contribution children.
pub fn contribution_children_weight(tree: &WeightedTree, id: &str) -> f64 {
    let total = tree.total_child_points(id);
    if total <= 0.0 {
        return 0.0;
    }
    let contribution_points: f64 = tree
        .children(id)
        .filter(|c| c.is_contribution())
        .map(|c| c.points)
        .sum();
    contribution_points / total
}

/// Share-weighted fulfillment contributed by the non-contribution children of `id`.
pub fn non_contribution_children_fulfillment(tree: &WeightedTree, id: &str) -> f64 {
    tree.children(id)
        .filter(|c| !c.is_contribution())
        .map(|child| fulfilled_node(tree, child) * tree.share_of_parent(&child.id))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_contribution_children_fill_parent() {
        // Two contribution children, 40 / 60 points
        let mut tree = WeightedTree::new("root", "Root");
        tree.insert_child("root", "x", "X", 40.0).unwrap();
        tree.insert_child("root", "y", "Y", 60.0).unwrap();
        tree.add_contributor("x", "bob").unwrap();
        tree.add_contributor("y", "carol").unwrap();

        assert!((tree.weight("x") - 0.4).abs() < EPS);
        assert!((tree.weight("y") - 0.6).abs() < EPS);
        assert!((fulfilled(&tree, "root") - 1.0).abs() < EPS);
        assert!(desire(&tree, "root").abs() < EPS);
    }

    #[test]
    fn test_leaf_rules() {
        let mut tree = WeightedTree::new("root", "Root");
        tree.insert_child("root", "empty", "Empty", 10.0).unwrap();
        tree.insert_child("root", "made", "Made", 10.0).unwrap();
        tree.add_contributor("made", "bob").unwrap();

        assert_eq!(fulfilled(&tree, "empty"), 0.0);
        assert_eq!(fulfilled(&tree, "made"), 1.0);
        assert!((fulfilled(&tree, "root") - 0.5).abs() < EPS);
        assert_eq!(fulfilled(&tree, "root-without-node"), 0.0);
    }

    #[test]
    fn test_manual_override_only_contribution_children() {
        let mut tree = WeightedTree::new("root", "Root");
        tree.insert_child("root", "n", "Node", 100.0).unwrap();
        tree.insert_child("n", "c", "Contribution", 100.0).unwrap();
        tree.add_contributor("c", "bob").unwrap();
        tree.set_manual_fulfillment("n", 0.5).unwrap();

        assert!((fulfilled(&tree, "n") - 0.5).abs() < EPS);
        assert!((desire(&tree, "n") - 0.5).abs() < EPS);
    }

    #[test]
    fn test_manual_override_blends_with_other_children() {
        // Contribution children hold 30% of points; the category child
        // (70%) is itself 2/7 fulfilled, contributing 0.2 to the parent.
        let mut tree = WeightedTree::new("root", "Root");
        tree.insert_child("root", "n", "Node", 1.0).unwrap();
        tree.insert_child("n", "c", "Contribution", 30.0).unwrap();
        tree.insert_child("n", "cat", "Category", 70.0).unwrap();
        tree.insert_child("cat", "done", "Done", 2.0).unwrap();
        tree.insert_child("cat", "todo", "Todo", 5.0).unwrap();
        tree.add_contributor("c", "bob").unwrap();
        tree.add_contributor("done", "carol").unwrap();
        tree.set_manual_fulfillment("n", 0.8).unwrap();

        assert!((contribution_children_weight(&tree, "n") - 0.3).abs() < EPS);
        assert!((non_contribution_children_fulfillment(&tree, "n") - 0.2).abs() < EPS);
        // 0.8 * 0.3 + 0.2 * 0.7
        assert!((fulfilled(&tree, "n") - 0.38).abs() < EPS);
    }

    #[test]
    fn test_manual_ignored_without_contribution_child() {
        let mut tree = WeightedTree::new("root", "Root");
        tree.insert_child("root", "n", "Node", 1.0).unwrap();
        tree.insert_child("n", "c", "Contribution", 1.0).unwrap();
        tree.insert_child("n", "cat", "Category", 1.0).unwrap();
        tree.add_contributor("c", "bob").unwrap();
        tree.set_manual_fulfillment("n", 0.9).unwrap();

        tree.remove_contributor("c", "bob").unwrap();
        // No contribution child left: plain weighted sum of two empty leaves
        assert_eq!(fulfilled(&tree, "n"), 0.0);
    }

    #[test]
    fn test_fulfilled_within_unit_interval() {
        let mut tree = WeightedTree::new("root", "Root");
        tree.insert_child("root", "a", "A", 3.0).unwrap();
        tree.insert_child("root", "b", "B", 0.0).unwrap();
        tree.insert_child("a", "a1", "A1", 1.0).unwrap();
        tree.insert_child("a", "a2", "A2", 2.0).unwrap();
        tree.add_contributor("a1", "bob").unwrap();
        tree.add_contributor("b", "carol").unwrap();
        tree.set_manual_fulfillment("a", 1.0).unwrap();

        for node in tree.nodes() {
            let f = fulfilled(&tree, &node.id);
            assert!((0.0..=1.0).contains(&f), "{} fulfilled {}", node.id, f);
        }
    }
}
