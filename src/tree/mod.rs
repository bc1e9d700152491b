//! Weighted contribution trees.
//!
//! A hierarchy is a tree of nodes where each node receives a share of its
//! parent's allocation proportional to its points. Leaves that declare one or
//! more contributors are *contributions*: concrete work attributed to other
//! peers. Everything here is synchronous and side-effect free apart from the
//! explicit mutation methods on [`WeightedTree`].
//!
//! ## Modules
//!
//! - [`models`]: `Node`, `NodeKind`, id aliases
//! - [`arena`]: `WeightedTree`: id-keyed arena, mutations, weights
//! - [`directory`]: `RecognitionDirectory`: contributor → instance index owned by the root
//! - [`fulfillment`]: fulfillment / desire derivation with manual override blending

pub mod arena;
pub mod directory;
pub mod fulfillment;
pub mod models;

pub use arena::WeightedTree;
pub use directory::RecognitionDirectory;
pub use fulfillment::{desire, fulfilled};
pub use models::{ContributorId, Node, NodeId, NodeKind};
