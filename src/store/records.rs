//! Persisted record types and the store path layout.
//!
//! ```text
//! trees/{root}/index               JSON array of node ids
//! trees/{root}/nodes/{id}          NodeRecord
//! peers/{root}/recognition         PublishedShares (recognition map)
//! peers/{root}/mutual_distribution PublishedShares (mutual distribution)
//! ```

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recognition::ShareMap;
use crate::tree::{ContributorId, Node, NodeId};

pub fn index_path(root: &str) -> String {
    format!("trees/{root}/index")
}

pub fn node_path(root: &str, node: &str) -> String {
    format!("trees/{root}/nodes/{node}")
}

pub fn recognition_path(root: &str) -> String {
    format!("peers/{root}/recognition")
}

pub fn distribution_path(root: &str) -> String {
    format!("peers/{root}/mutual_distribution")
}

/// Persisted fields of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_fulfillment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub contributors: BTreeSet<ContributorId>,
}

impl NodeRecord {
    pub fn from_node(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            points: node.points,
            manual_fulfillment: node.manual_fulfillment,
            parent_id: node.parent.clone(),
            contributors: node.contributors.clone(),
        }
    }
}

/// A share map published for peers, stamped with the publisher's revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedShares {
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    pub shares: ShareMap,
}

impl PublishedShares {
    pub fn new(revision: u64, shares: ShareMap) -> Self {
        Self {
            revision,
            updated_at: Utc::now(),
            shares,
        }
    }
}
