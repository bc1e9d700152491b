//! Node data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable identifier of a node. Root ids double as peer identifiers.
pub type NodeId = String;

/// Identifier of a recognized contributor (another hierarchy's root id).
pub type ContributorId = String;

/// Explicit role of a node, recomputed at every mutation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// No parent. Owns the recognition directory, never an instance.
    Root,
    /// Non-contribution node, with or without children.
    Category,
    /// Declares at least one contributor, has no children.
    Contribution,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Category => write!(f, "category"),
            Self::Contribution => write!(f, "contribution"),
        }
    }
}

/// One vertex of a hierarchy. Links are ids resolved through the owning arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Raw weight assigned by the parent.
    pub points: f64,
    pub parent: Option<NodeId>,
    /// Direct children in insertion order.
    pub children: Vec<NodeId>,
    pub contributors: BTreeSet<ContributorId>,
    /// Operator override, only meaningful with at least one contribution child.
    pub manual_fulfillment: Option<f64>,
    pub kind: NodeKind,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, points: f64, parent: Option<NodeId>) -> Self {
        let kind = if parent.is_none() {
            NodeKind::Root
        } else {
            NodeKind::Category
        };
        Self {
            id,
            name,
            points,
            parent,
            children: Vec::new(),
            contributors: BTreeSet::new(),
            manual_fulfillment: None,
            kind,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_contribution(&self) -> bool {
        self.kind == NodeKind::Contribution
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Re-derive `kind` from parent linkage and the contributor set.
    pub(crate) fn refresh_kind(&mut self) {
        self.kind = if self.parent.is_none() {
            NodeKind::Root
        } else if self.contributors.is_empty() {
            NodeKind::Category
        } else {
            NodeKind::Contribution
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_kind() {
        let mut root = Node::new("r".into(), "Root".into(), 0.0, None);
        root.contributors.insert("bob".into());
        root.refresh_kind();
        assert_eq!(root.kind, NodeKind::Root);

        let mut child = Node::new("c".into(), "Child".into(), 10.0, Some("r".into()));
        assert_eq!(child.kind, NodeKind::Category);
        child.contributors.insert("bob".into());
        child.refresh_kind();
        assert!(child.is_contribution());
        child.contributors.clear();
        child.refresh_kind();
        assert_eq!(child.kind, NodeKind::Category);
    }

    #[test]
    fn test_kind_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&NodeKind::Contribution).unwrap(),
            "\"contribution\""
        );
    }
}
