//! External store boundary.
//!
//! The replicated key-value store is an external collaborator: this module
//! defines the trait the rest of the crate talks to, an in-memory
//! implementation, and the helpers that keep store faults from leaking into
//! computations (bounded reads, cancelable subscriptions).

pub mod bounded;
pub mod memory;
pub mod records;
pub mod subscription;
pub mod traits;

pub use bounded::{read_bounded, read_json, ReadOutcome};
pub use memory::MemoryStore;
pub use records::{NodeRecord, PublishedShares};
pub use subscription::Subscription;
pub use traits::{Store, StoreEvent};
