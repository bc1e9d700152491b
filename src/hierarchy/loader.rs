//! Bulk load of a hierarchy from the store.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::manager::Hierarchy;
use super::publisher::PUBLISH_KEY;
use crate::error::RecognitionError;
use crate::store::records::{index_path, node_path};
use crate::store::{read_json, NodeRecord, ReadOutcome, Store};
use crate::tree::WeightedTree;
use crate::Config;

impl Hierarchy {
    /// Rebuild `root_id`'s hierarchy from its persisted records.
    ///
    /// Runs inside a scheduler startup phase, so every recompute requested while
    /// peers are linked collapses into one publish at the end. Records whose
    /// parent cannot be resolved are skipped. Fails only when the index itself
    /// cannot be read.
    pub async fn load(root_id: &str, store: Arc<dyn Store>, config: &Config) -> anyhow::Result<Self> {
        let timeout = config.read_timeout;
        let ids: Vec<String> =
            match read_json::<Vec<String>>(store.as_ref(), &index_path(root_id), timeout).await {
                ReadOutcome::Ok(ids) => ids.unwrap_or_default(),
                ReadOutcome::TimedOut => {
                    return Err(RecognitionError::StoreTimeout {
                        path: index_path(root_id),
                        after: timeout,
                    }
                    .into())
                }
                ReadOutcome::Err(e) => return Err(e.context(format!("loading index of {root_id}"))),
            };

        let reads = ids.iter().map(|id| {
            let store = store.clone();
            async move {
                let record =
                    read_json::<NodeRecord>(store.as_ref(), &node_path(root_id, id), timeout)
                        .await
                        .ok()
                        .flatten();
                (id.clone(), record)
            }
        });
        let mut records: HashMap<String, NodeRecord> = join_all(reads)
            .await
            .into_iter()
            .filter_map(|(id, record)| record.map(|r| (id, r)))
            .collect();

        let name = records
            .remove(root_id)
            .map(|r| r.name)
            .unwrap_or_else(|| root_id.to_string());
        let (tree, skipped) = build_tree(root_id, &name, records);
        info!(root = %root_id, nodes = tree.len(), skipped, "Hierarchy loaded from store");

        let hierarchy = Self::from_tree(tree, store, config);
        let inner = &hierarchy.inner;
        inner.scheduler.begin_startup();
        let new_peers = {
            let mut guard = inner.state.lock().await;
            let state = &mut *guard;
            state.bump_revision();
            inner.sync_peers(state).await
        };
        inner.refresh_reciprocals(&new_peers).await;
        inner.scheduler.schedule(PUBLISH_KEY);
        inner.scheduler.end_startup().await;

        Ok(hierarchy)
    }
}

/// Insert records parent-first. Returns the tree and the number of skipped records.
fn build_tree(
    root_id: &str,
    name: &str,
    records: HashMap<String, NodeRecord>,
) -> (WeightedTree, usize) {
    let mut tree = WeightedTree::new(root_id, name);
    let mut pending: Vec<(String, NodeRecord)> = records.into_iter().collect();
    pending.sort_by(|a, b| a.0.cmp(&b.0));
    let mut manual = Vec::new();
    let mut skipped = 0;

    loop {
        let before = pending.len();
        let mut deferred = Vec::new();
        for (id, record) in pending {
            let Some(parent) = record.parent_id.as_deref() else {
                warn!(root = %root_id, node = %id, "Record without parent, skipping");
                skipped += 1;
                continue;
            };
            if !tree.contains(parent) {
                deferred.push((id, record));
                continue;
            }
            let inserted = tree
                .insert_child(parent, id.as_str(), record.name.as_str(), record.points)
                .and_then(|_| {
                    record
                        .contributors
                        .iter()
                        .try_for_each(|c| tree.add_contributor(&id, c).map(|_| ()))
                });
            match inserted {
                Ok(()) => {
                    if let Some(value) = record.manual_fulfillment {
                        manual.push((id, value));
                    }
                }
                Err(e) => {
                    warn!(root = %root_id, node = %id, error = %e, "Invalid record, skipping");
                    skipped += 1;
                }
            }
        }
        pending = deferred;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    for (id, record) in &pending {
        let err = RecognitionError::UnresolvedReference(format!(
            "node {id} -> parent {}",
            record.parent_id.as_deref().unwrap_or_default()
        ));
        warn!(root = %root_id, error = %err, "Skipping record");
    }
    skipped += pending.len();

    // Manual overrides need the contribution children in place
    for (id, value) in manual {
        if let Err(e) = tree.set_manual_fulfillment(&id, value) {
            warn!(root = %root_id, node = %id, error = %e, "Dropping manual fulfillment");
        }
    }

    (tree, skipped)
}
