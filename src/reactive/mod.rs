//! Keeping derived values fresh under bursty updates.
//!
//! Two complementary mechanisms:
//! - **Time-boxed memoization** ([`memo`]): expensive queries are cached per
//!   `(node, operation, args)` with a per-operation staleness window.
//! - **Dependency-tracked cells** ([`cell`]): reading a cell inside a derived
//!   computation records an edge; writes invalidate transitive dependents.
//!
//! Values that get written back to the store are recomputed through the
//! [`scheduler`] (debounce, cooldown, startup batching) and persisted through
//! the [`flush`] write batcher.
//!
//! ## Modules
//!
//! - [`memo`]: `QueryCache` with staleness windows
//! - [`cell`]: `ReactiveGraph` of source and derived cells
//! - [`delay`]: cancelable `DelayedTask`
//! - [`scheduler`]: `RecomputeScheduler`
//! - [`flush`]: `WriteBatcher`

pub mod cell;
pub mod delay;
pub mod flush;
pub mod memo;
pub mod scheduler;

pub use cell::{CellId, ObserverId, ReactiveGraph};
pub use delay::DelayedTask;
pub use flush::WriteBatcher;
pub use memo::{CacheConfig, CachedValue, QueryCache, QueryKey, QueryOp};
pub use scheduler::{RecomputeHandler, RecomputeScheduler, RecomputeTrigger, SchedulerConfig};
