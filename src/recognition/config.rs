//! Configuration for the transitive traversal.

use serde::{Deserialize, Serialize};

/// Parameters of the multi-hop social distribution traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Number of transitive hops beyond the direct peers. 0 = direct peers only.
    pub max_depth: usize,

    /// Edges carrying less than this share are neither counted nor followed.
    pub min_share: f64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_share: 1e-4,
        }
    }
}

impl TraversalConfig {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            max_depth: depth,
            ..Default::default()
        }
    }
}
