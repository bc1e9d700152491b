//! Local snapshot of a peer network.
//!
//! [`NetworkSpec`] is a YAML description of several hierarchies;
//! [`PeerNetwork`] builds their trees and answers mutual and social queries
//! synchronously, reading reciprocal shares straight from the other trees
//! instead of from published records.
//!
//! ```yaml
//! peers:
//!   - id: alice
//!     name: Alice
//!     children:
//!       - name: Garden
//!         points: 80
//!         contributors: [bob]
//!       - name: Music
//!         points: 20
//!         children:
//!           - name: Lessons
//!             points: 1
//!             contributors: [carol]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{RecognitionError, Result};
use crate::recognition::{
    self, DistributionSource, ReciprocalShares, ShareMap, SocialDistribution, TraversalConfig,
};
use crate::store::records::{index_path, node_path};
use crate::store::{NodeRecord, Store};
use crate::tree::WeightedTree;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    pub peers: Vec<PeerSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Derived from the parent id and name when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub manual_fulfillment: Option<f64>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NetworkSpec {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("parsing network spec")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&contents)
    }
}

impl PeerSpec {
    pub fn build_tree(&self) -> Result<WeightedTree> {
        let mut tree = WeightedTree::new(self.id.as_str(), self.name.as_deref().unwrap_or(&self.id));
        for (index, child) in self.children.iter().enumerate() {
            insert_spec(&mut tree, &self.id, index, child)?;
        }
        Ok(tree)
    }
}

/// Generated ids hash the parent id and the sibling position, so siblings may
/// share a name.
fn insert_spec(tree: &mut WeightedTree, parent: &str, index: usize, spec: &NodeSpec) -> Result<()> {
    let id = spec.id.clone().unwrap_or_else(|| {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{parent}/{index}").as_bytes()).to_string()
    });
    if !spec.contributors.is_empty() && !spec.children.is_empty() {
        return Err(RecognitionError::InvalidState(format!(
            "'{}' declares contributors and children",
            spec.name
        )));
    }

    tree.insert_child(parent, id.as_str(), spec.name.as_str(), spec.points)?;
    for (index, child) in spec.children.iter().enumerate() {
        insert_spec(tree, &id, index, child)?;
    }
    for contributor in &spec.contributors {
        tree.add_contributor(&id, contributor)?;
    }
    if let Some(value) = spec.manual_fulfillment {
        tree.set_manual_fulfillment(&id, value)?;
    }
    Ok(())
}

/// Trees of several peers, keyed by root id.
#[derive(Debug, Clone, Default)]
pub struct PeerNetwork {
    trees: BTreeMap<String, WeightedTree>,
}

impl PeerNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_spec(spec: &NetworkSpec) -> Result<Self> {
        let mut network = Self::new();
        for peer in &spec.peers {
            network.insert(peer.build_tree()?);
        }
        Ok(network)
    }

    pub fn insert(&mut self, tree: WeightedTree) {
        self.trees.insert(tree.root_id().to_string(), tree);
    }

    pub fn tree(&self, peer: &str) -> Option<&WeightedTree> {
        self.trees.get(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    /// Share `to`'s hierarchy attributes to `from`; 0 when `to` is unknown.
    pub fn reciprocal(&self, from: &str, to: &str) -> f64 {
        self.trees
            .get(to)
            .map(|tree| recognition::share_of_general_fulfillment(tree, from))
            .unwrap_or(0.0)
    }

    pub fn share_of_general_fulfillment(&self, from: &str, to: &str) -> f64 {
        self.reciprocal(to, from)
    }

    pub fn mutual_fulfillment(&self, a: &str, b: &str) -> f64 {
        match self.trees.get(a) {
            Some(tree) => recognition::mutual_fulfillment(tree, b, self.reciprocal(a, b)),
            None => 0.0,
        }
    }

    pub fn recognition_map(&self, peer: &str) -> ShareMap {
        self.trees
            .get(peer)
            .map(recognition::recognition_map)
            .unwrap_or_default()
    }

    pub fn mutual_distribution(&self, peer: &str) -> ShareMap {
        match self.trees.get(peer) {
            Some(tree) => recognition::mutual_fulfillment_distribution(
                tree,
                &Reciprocals {
                    network: self,
                    root: peer,
                },
            ),
            None => ShareMap::new(),
        }
    }

    pub async fn social_distribution(
        &self,
        peer: &str,
        config: &TraversalConfig,
    ) -> SocialDistribution {
        let direct = self.mutual_distribution(peer);
        recognition::social_distribution(peer, &direct, self, config).await
    }

    /// Write every tree's index and node records. Returns the number of writes.
    pub async fn persist(&self, store: &dyn Store) -> anyhow::Result<usize> {
        let mut writes = 0;
        for (root, tree) in &self.trees {
            let mut ids: Vec<&str> = tree.nodes().map(|n| n.id.as_str()).collect();
            ids.sort_unstable();
            store.put(&index_path(root), json!(ids)).await?;
            writes += 1;

            for node in tree.nodes() {
                let record = serde_json::to_value(NodeRecord::from_node(node))?;
                store.put(&node_path(root, &node.id), record).await?;
                writes += 1;
            }
        }
        Ok(writes)
    }
}

struct Reciprocals<'a> {
    network: &'a PeerNetwork,
    root: &'a str,
}

impl ReciprocalShares for Reciprocals<'_> {
    fn reciprocal_share(&self, peer: &str) -> f64 {
        self.network.reciprocal(self.root, peer)
    }
}

#[async_trait]
impl DistributionSource for PeerNetwork {
    async fn distribution(&self, peer: &str) -> Option<ShareMap> {
        self.trees
            .contains_key(peer)
            .then(|| self.mutual_distribution(peer))
    }
}
