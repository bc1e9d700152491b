//! Recognition across hierarchies.
//!
//! ```text
//! WeightedTree + RecognitionDirectory
//!         │
//!   share_of_general_fulfillment ──► recognition_map (published)
//!         │
//!   mutual_fulfillment = min(ours, reciprocal)
//!         │
//!   mutual_fulfillment_distribution (normalized, published)
//!         │
//!   social_distribution (multi-hop over peers' distributions)
//! ```
//!
//! ## Modules
//!
//! - [`shares`]: `ShareMap` and normalization
//! - [`mutual`]: one-directional and mutual recognition
//! - [`traversal`]: breadth-first transitive distribution
//! - [`config`]: traversal parameters

pub mod config;
pub mod mutual;
pub mod shares;
pub mod traversal;

pub use config::TraversalConfig;
pub use mutual::{
    mutual_fulfillment, mutual_fulfillment_distribution, recognition_map,
    share_of_general_fulfillment, ReciprocalShares,
};
pub use shares::{normalize, ShareMap};
pub use traversal::{social_distribution, DistributionSource, SocialDistribution};
