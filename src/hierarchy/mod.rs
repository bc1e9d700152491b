//! Live hierarchies bound to the store.
//!
//! A [`Hierarchy`] wires one root's tree and directory to the reactive layer
//! and the external store:
//! - Mutations go through a single commit path (validate, apply, persist,
//!   invalidate, notify, schedule publish)
//! - Each recognized peer gets a reciprocal source cell fed by a store
//!   subscription, and a derived mutual cell whose changes trigger a publish
//! - The recognition map and mutual distribution are published under
//!   `peers/{root}/…` so other hierarchies can read them without a live link
//!
//! Cross-peer reads are limited to [`PeerQueries`].

mod loader;
mod manager;
mod publisher;
mod source;

use async_trait::async_trait;

pub use manager::Hierarchy;
pub use source::StoreDistributionSource;

/// The read-only surface other peers may call.
#[async_trait]
pub trait PeerQueries: Send + Sync {
    /// How much this hierarchy recognizes `peer`.
    async fn share_of_general_fulfillment(&self, peer: &str) -> f64;

    /// `min` of both directions of recognition between this hierarchy and `peer`.
    async fn mutual_fulfillment(&self, peer: &str) -> f64;
}

#[async_trait]
impl PeerQueries for Hierarchy {
    async fn share_of_general_fulfillment(&self, peer: &str) -> f64 {
        Hierarchy::share_of_general_fulfillment(self, peer).await
    }

    async fn mutual_fulfillment(&self, peer: &str) -> f64 {
        Hierarchy::mutual_fulfillment(self, peer).await
    }
}
