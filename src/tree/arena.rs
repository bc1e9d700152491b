//! Weighted tree stored as an id-keyed arena.
//!
//! Parent/child links are ids looked up through the arena, so the tree has no
//! owning back-references. Every mutation validates its input, updates the
//! owned [`RecognitionDirectory`], and refreshes the affected nodes' [`NodeKind`]
//! before returning.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::directory::RecognitionDirectory;
use super::models::{Node, NodeId};
use crate::error::{RecognitionError, Result};

#[derive(Debug, Clone)]
pub struct WeightedTree {
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
    directory: RecognitionDirectory,
}

fn validate_points(points: f64) -> Result<()> {
    if !points.is_finite() || points < 0.0 {
        return Err(RecognitionError::Validation(format!(
            "points must be a non-negative number, got {points}"
        )));
    }
    Ok(())
}

impl WeightedTree {
    /// Create a hierarchy containing only its root.
    pub fn new(root_id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let root = Node::new(root_id.clone(), name.into(), 0.0, None);
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            root: root_id,
            nodes,
            directory: RecognitionDirectory::new(),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> &Node {
        // The root is inserted at construction and never removable.
        &self.nodes[&self.root]
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look up a node, failing with `NodeNotFound`.
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| RecognitionError::NodeNotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| RecognitionError::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn directory(&self) -> &RecognitionDirectory {
        &self.directory
    }

    /// Direct children of `id` in insertion order.
    pub fn children(&self, id: &str) -> impl Iterator<Item = &Node> {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Pre-order list of `id` and everything below it.
    pub fn descendants(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            stack.extend(node.children.iter().rev().cloned());
            out.push(current);
        }
        out
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a child with a freshly generated id.
    pub fn add_child(&mut self, parent: &str, name: impl Into<String>, points: f64) -> Result<NodeId> {
        self.insert_child(parent, Uuid::new_v4().to_string(), name, points)
    }

    /// Add a child with a caller-chosen id (bulk load, fixtures).
    pub fn insert_child(
        &mut self,
        parent: &str,
        id: impl Into<NodeId>,
        name: impl Into<String>,
        points: f64,
    ) -> Result<NodeId> {
        validate_points(points)?;
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(RecognitionError::InvalidState(format!(
                "node '{id}' already exists"
            )));
        }
        let parent_node = self.node_mut(parent)?;
        if !parent_node.contributors.is_empty() {
            return Err(RecognitionError::InvalidState(format!(
                "node '{parent}' is a contribution and cannot have children"
            )));
        }
        parent_node.children.push(id.clone());

        let child = Node::new(id.clone(), name.into(), points, Some(parent.to_string()));
        self.nodes.insert(id.clone(), child);
        Ok(id)
    }

    /// Remove `child` and its whole subtree from `parent`.
    ///
    /// Directory entries of every removed node are unregistered before the
    /// removed nodes are returned.
    pub fn remove_child(&mut self, parent: &str, child: &str) -> Result<Vec<Node>> {
        let parent_node = self.node_mut(parent)?;
        let Some(pos) = parent_node.children.iter().position(|c| c == child) else {
            return Err(RecognitionError::NodeNotFound(format!("{parent}/{child}")));
        };
        parent_node.children.remove(pos);
        Ok(self.detach_subtree(child))
    }

    fn detach_subtree(&mut self, id: &str) -> Vec<Node> {
        let ids = self.descendants(id);
        let mut removed = Vec::with_capacity(ids.len());
        for node_id in ids {
            if let Some(node) = self.nodes.remove(&node_id) {
                for contributor in &node.contributors {
                    self.directory.unregister(contributor, &node.id);
                }
                removed.push(node);
            }
        }
        debug!(root = %self.root, node = %id, removed = removed.len(), "Subtree removed");
        removed
    }

    pub fn set_points(&mut self, id: &str, points: f64) -> Result<()> {
        validate_points(points)?;
        self.node_mut(id)?.points = points;
        Ok(())
    }

    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    /// Declare `id` an instance of `contributor`.
    ///
    /// Any existing children are removed first (with directory cleanup); they
    /// are returned so callers can drop their persisted state.
    pub fn add_contributor(&mut self, id: &str, contributor: &str) -> Result<Vec<Node>> {
        let node = self.node(id)?;
        if node.is_root() {
            return Err(RecognitionError::InvalidState(format!(
                "root '{id}' cannot be an instance of a contributor"
            )));
        }

        let mut removed = Vec::new();
        for child in node.children.clone() {
            removed.extend(self.detach_subtree(&child));
        }

        let node = self.node_mut(id)?;
        node.children.clear();
        node.contributors.insert(contributor.to_string());
        node.refresh_kind();
        self.directory.register(contributor, id);
        Ok(removed)
    }

    /// Withdraw `id` as an instance of `contributor`. Returns whether it was declared.
    pub fn remove_contributor(&mut self, id: &str, contributor: &str) -> Result<bool> {
        let node = self.node_mut(id)?;
        let removed = node.contributors.remove(contributor);
        node.refresh_kind();
        if removed {
            self.directory.unregister(contributor, id);
        }
        Ok(removed)
    }

    /// Set the operator override for a node that has a contribution child.
    pub fn set_manual_fulfillment(&mut self, id: &str, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(RecognitionError::Validation(format!(
                "manual fulfillment must be within [0, 1], got {value}"
            )));
        }
        if !self.has_contribution_child(id) {
            self.node(id)?;
            return Err(RecognitionError::InvalidState(format!(
                "node '{id}' has no contribution child"
            )));
        }
        self.node_mut(id)?.manual_fulfillment = Some(value);
        Ok(())
    }

    pub fn clear_manual_fulfillment(&mut self, id: &str) -> Result<()> {
        self.node_mut(id)?.manual_fulfillment = None;
        Ok(())
    }

    // ========================================================================
    // Weights
    // ========================================================================

    /// Sum of the direct children's points, always recomputed from the children.
    pub fn total_child_points(&self, id: &str) -> f64 {
        self.children(id).map(|c| c.points).sum()
    }

    pub fn has_contribution_child(&self, id: &str) -> bool {
        self.children(id).any(Node::is_contribution)
    }

    /// `points / totalChildPoints(parent)`; 1 for the root, 0 when the parent has no points.
    pub fn share_of_parent(&self, id: &str) -> f64 {
        let Some(node) = self.nodes.get(id) else {
            return 0.0;
        };
        let Some(parent) = node.parent.as_deref() else {
            return 1.0;
        };
        let total = self.total_child_points(parent);
        if total > 0.0 {
            node.points / total
        } else {
            0.0
        }
    }

    /// Product of shares along the path to the root.
    pub fn weight(&self, id: &str) -> f64 {
        let mut weight = 1.0;
        let mut current = match self.nodes.get(id) {
            Some(node) => node,
            None => return 0.0,
        };
        while let Some(parent) = current.parent.as_deref() {
            weight *= self.share_of_parent(&current.id);
            if weight == 0.0 {
                return 0.0;
            }
            current = match self.nodes.get(parent) {
                Some(node) => node,
                None => return 0.0,
            };
        }
        weight
    }
}
