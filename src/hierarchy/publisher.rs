//! Publishing derived shares for peers.

use std::sync::Weak;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::manager::HierarchyInner;
use crate::events::{EventEmitter, TreeEvent, TreeEventKind};
use crate::reactive::RecomputeHandler;
use crate::recognition::{mutual_fulfillment_distribution, recognition_map};
use crate::store::records::{distribution_path, recognition_path};
use crate::store::PublishedShares;

/// Scheduler key of the publish job.
pub(crate) const PUBLISH_KEY: &str = "shares";

/// Scheduler handler writing the recognition map and mutual distribution.
pub(crate) struct SharePublisher {
    inner: Weak<HierarchyInner>,
}

impl SharePublisher {
    pub(crate) fn new(inner: Weak<HierarchyInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecomputeHandler for SharePublisher {
    async fn recompute(&self, keys: Vec<String>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if !keys.iter().any(|k| k == PUBLISH_KEY) {
            debug!(root = %inner.root_id, keys = ?keys, "No publish requested");
            return;
        }
        if let Err(e) = inner.publish().await {
            warn!(root = %inner.root_id, error = %e, "Failed to publish shares");
        }
    }
}

impl HierarchyInner {
    /// Stage and flush both published maps. Returns the revision used.
    ///
    /// Revisions are wall-clock milliseconds, bumped when needed, so they keep
    /// increasing across restarts of the same root.
    pub(crate) async fn publish(&self) -> anyhow::Result<u64> {
        let (revision, recognition, distribution) = {
            let mut state = self.state.lock().await;
            let now = Utc::now().timestamp_millis().max(0) as u64;
            state.publish_revision = (state.publish_revision + 1).max(now);
            let recognition = recognition_map(&state.tree);
            let distribution =
                mutual_fulfillment_distribution(&state.tree, &state.reciprocal_snapshot());
            (state.publish_revision, recognition, distribution)
        };
        let peers = distribution.len();

        let recognition = serde_json::to_value(PublishedShares::new(revision, recognition))?;
        let distribution = serde_json::to_value(PublishedShares::new(revision, distribution))?;
        self.writer
            .stage(recognition_path(&self.root_id), recognition)
            .await;
        self.writer
            .stage(distribution_path(&self.root_id), distribution)
            .await;
        self.writer.flush().await;

        self.events.emit(
            TreeEvent::new(TreeEventKind::SharesPublished, &self.root_id, &self.root_id)
                .with_payload(json!({ "revision": revision, "peers": peers })),
        );
        info!(root = %self.root_id, revision, peers, "Shares published");
        Ok(revision)
    }
}
