//! Error taxonomy for tree mutations and recognition queries.
//!
//! Caller-facing misuse (`Validation`, `InvalidState`, `NodeNotFound`) is
//! returned immediately. `UnresolvedReference` and `StoreTimeout` are
//! non-fatal: they are logged where they occur and the enclosing aggregate
//! computation continues with a degraded result.

use std::time::Duration;

use crate::tree::NodeId;

/// Errors produced by the recognition engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecognitionError {
    /// A value is outside its allowed range (negative points, fulfillment outside [0,1]).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not allowed in the node's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The addressed node does not exist in the hierarchy.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A directory entry or traversal hop points at something not locally resolvable.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// An external store read exceeded its bound.
    #[error("store read of '{path}' timed out after {after:?}")]
    StoreTimeout { path: String, after: Duration },
}

impl RecognitionError {
    /// Whether the error is absorbed by aggregate computations instead of surfaced.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference(_) | Self::StoreTimeout { .. }
        )
    }
}

/// Result alias for core tree and recognition operations.
pub type Result<T> = std::result::Result<T, RecognitionError>;
