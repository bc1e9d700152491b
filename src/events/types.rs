//! Hierarchy change events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What changed in a hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeEventKind {
    NodeAdded,
    NodeRemoved,
    PointsChanged,
    Renamed,
    ManualFulfillmentChanged,
    ContributorAdded,
    ContributorRemoved,
    /// Recognition map and mutual distribution were written to the store
    SharesPublished,
}

/// Emitted after a successful mutation or publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEvent {
    pub kind: TreeEventKind,
    /// Root of the hierarchy the event belongs to
    pub root_id: String,
    /// Affected node (the root itself for `SharesPublished`)
    pub node_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TreeEvent {
    pub fn new(kind: TreeEventKind, root_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            kind,
            root_id: root_id.into(),
            node_id: node_id.into(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Sink for tree events. Emitting never blocks and never fails.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: TreeEvent);
}
