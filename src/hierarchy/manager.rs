//! Hierarchy - one live root instance
//!
//! Owns the weighted tree, its reactive cells and its links to peers, and
//! routes every mutation through the same commit path: apply to the tree, bump
//! the local revision, re-link peers, stage store writes, invalidate the query
//! cache, emit an event and schedule a publish.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::publisher::{SharePublisher, PUBLISH_KEY};
use super::source::StoreDistributionSource;
use crate::error::{RecognitionError, Result};
use crate::events::{EventBus, EventEmitter, TreeEvent, TreeEventKind};
use crate::reactive::{
    CellId, QueryCache, QueryKey, QueryOp, ReactiveGraph, RecomputeScheduler, WriteBatcher,
};
use crate::recognition::{self, ShareMap, SocialDistribution, TraversalConfig};
use crate::store::records::{index_path, node_path, recognition_path};
use crate::store::{read_json, NodeRecord, PublishedShares, Store, StoreEvent, Subscription};
use crate::tree::{fulfillment, Node, NodeId, WeightedTree};
use crate::Config;

/// Live link to a recognized peer.
pub(crate) struct PeerLink {
    /// Share the peer last reported toward us.
    pub reciprocal: CellId,
    /// `min(our share, reciprocal)`, observed to trigger publishing.
    pub mutual: CellId,
    pub last_revision: Option<u64>,
    pub subscription: Subscription,
}

pub(crate) struct HierarchyState {
    pub tree: WeightedTree,
    pub cells: ReactiveGraph<f64, WeightedTree>,
    pub revision_cell: CellId,
    pub revision: u64,
    pub peers: HashMap<String, PeerLink>,
    pub publish_revision: u64,
}

impl HierarchyState {
    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
        self.cells
            .set(self.revision_cell, self.revision as f64, &self.tree);
    }

    fn mutual_value(&mut self, peer: &str) -> f64 {
        let Some(cell) = self.peers.get(peer).map(|link| link.mutual) else {
            return 0.0;
        };
        self.cells.get(cell, &self.tree).unwrap_or(0.0)
    }

    pub(crate) fn reciprocal_snapshot(&self) -> HashMap<String, f64> {
        self.peers
            .iter()
            .map(|(peer, link)| (peer.clone(), self.cells.peek(link.reciprocal).unwrap_or(0.0)))
            .collect()
    }
}

/// Nodes written or deleted by one mutation.
#[derive(Default)]
struct Change {
    touched: Vec<NodeId>,
    removed: Vec<Node>,
    structural: bool,
}

pub(crate) struct HierarchyInner {
    pub root_id: String,
    pub state: Mutex<HierarchyState>,
    pub store: Arc<dyn Store>,
    pub cache: Arc<QueryCache>,
    pub scheduler: RecomputeScheduler,
    pub writer: WriteBatcher,
    pub events: EventBus,
    pub config: Config,
}

/// A hierarchy root bound to the store. Cheap to clone.
#[derive(Clone)]
pub struct Hierarchy {
    pub(crate) inner: Arc<HierarchyInner>,
}

impl Hierarchy {
    /// Create an in-memory hierarchy without touching the store.
    pub fn new(
        root_id: impl Into<String>,
        name: impl Into<String>,
        store: Arc<dyn Store>,
        config: &Config,
    ) -> Self {
        Self::from_tree(WeightedTree::new(root_id, name), store, config)
    }

    /// Create a hierarchy and persist its root record.
    pub async fn create(
        root_id: impl Into<String>,
        name: impl Into<String>,
        store: Arc<dyn Store>,
        config: &Config,
    ) -> Self {
        let hierarchy = Self::new(root_id, name, store, config);
        {
            let state = hierarchy.inner.state.lock().await;
            let change = Change {
                touched: vec![hierarchy.inner.root_id.clone()],
                removed: Vec::new(),
                structural: true,
            };
            hierarchy.inner.stage_change(&state.tree, &change).await;
        }
        hierarchy
    }

    pub(crate) fn from_tree(tree: WeightedTree, store: Arc<dyn Store>, config: &Config) -> Self {
        let root_id = tree.root_id().to_string();
        let mut cells = ReactiveGraph::new();
        let revision_cell = cells.source(0.0);

        let inner = Arc::new_cyclic(|weak| {
            let scheduler = RecomputeScheduler::new(
                Arc::new(SharePublisher::new(weak.clone())),
                config.scheduler.clone(),
            );
            HierarchyInner {
                root_id,
                state: Mutex::new(HierarchyState {
                    tree,
                    cells,
                    revision_cell,
                    revision: 0,
                    peers: HashMap::new(),
                    publish_revision: 0,
                }),
                writer: WriteBatcher::new(
                    store.clone(),
                    std::time::Duration::from_millis(config.scheduler.flush_ms),
                ),
                store,
                cache: Arc::new(QueryCache::new(&config.cache)),
                scheduler,
                events: EventBus::default(),
                config: config.clone(),
            }
        });
        Self { inner }
    }

    pub fn root_id(&self) -> &str {
        &self.inner.root_id
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn scheduler(&self) -> &RecomputeScheduler {
        &self.inner.scheduler
    }

    /// Copy of the current tree.
    pub async fn snapshot(&self) -> WeightedTree {
        self.inner.state.lock().await.tree.clone()
    }

    /// Number of local mutations applied so far.
    pub async fn revision(&self) -> u64 {
        self.inner.state.lock().await.revision
    }

    /// Peers currently linked through a recognition subscription, sorted.
    pub async fn linked_peers(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut peers: Vec<_> = state.peers.keys().cloned().collect();
        peers.sort();
        peers
    }

    // ========================================================================
    // Write surface
    // ========================================================================

    pub async fn add_child(&self, parent: &str, name: &str, points: f64) -> Result<NodeId> {
        let id = Uuid::new_v4().to_string();
        self.insert_child(parent, &id, name, points).await
    }

    /// Add a child under a caller-chosen id.
    pub async fn insert_child(
        &self,
        parent: &str,
        id: &str,
        name: &str,
        points: f64,
    ) -> Result<NodeId> {
        let event = TreeEvent::new(TreeEventKind::NodeAdded, self.root_id(), id)
            .with_payload(json!({ "parent_id": parent, "name": name, "points": points }));
        self.commit(event, |tree| {
            let id = tree.insert_child(parent, id, name, points)?;
            let change = Change {
                touched: vec![id.clone()],
                removed: Vec::new(),
                structural: true,
            };
            Ok((id, change))
        })
        .await
    }

    /// Remove `child` and its subtree. Returns the ids of every removed node.
    pub async fn remove_child(&self, parent: &str, child: &str) -> Result<Vec<NodeId>> {
        let event = TreeEvent::new(TreeEventKind::NodeRemoved, self.root_id(), child)
            .with_payload(json!({ "parent_id": parent }));
        self.commit(event, |tree| {
            let removed = tree.remove_child(parent, child)?;
            let ids = removed.iter().map(|n| n.id.clone()).collect();
            let change = Change {
                touched: vec![parent.to_string()],
                removed,
                structural: true,
            };
            Ok((ids, change))
        })
        .await
    }

    pub async fn set_points(&self, id: &str, points: f64) -> Result<()> {
        let event = TreeEvent::new(TreeEventKind::PointsChanged, self.root_id(), id)
            .with_payload(json!({ "points": points }));
        self.commit(event, |tree| {
            tree.set_points(id, points)?;
            Ok(((), Change::touching(id)))
        })
        .await
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        let event = TreeEvent::new(TreeEventKind::Renamed, self.root_id(), id)
            .with_payload(json!({ "name": name }));
        self.commit(event, |tree| {
            tree.rename(id, name)?;
            Ok(((), Change::touching(id)))
        })
        .await
    }

    pub async fn set_manual_fulfillment(&self, id: &str, value: f64) -> Result<()> {
        let event = TreeEvent::new(TreeEventKind::ManualFulfillmentChanged, self.root_id(), id)
            .with_payload(json!({ "manual_fulfillment": value }));
        self.commit(event, |tree| {
            tree.set_manual_fulfillment(id, value)?;
            Ok(((), Change::touching(id)))
        })
        .await
    }

    pub async fn clear_manual_fulfillment(&self, id: &str) -> Result<()> {
        let event = TreeEvent::new(TreeEventKind::ManualFulfillmentChanged, self.root_id(), id);
        self.commit(event, |tree| {
            tree.clear_manual_fulfillment(id)?;
            Ok(((), Change::touching(id)))
        })
        .await
    }

    /// Declare `id` an instance of `contributor`, dropping any children it had.
    pub async fn add_contributor(&self, id: &str, contributor: &str) -> Result<()> {
        let event = TreeEvent::new(TreeEventKind::ContributorAdded, self.root_id(), id)
            .with_payload(json!({ "contributor": contributor }));
        self.commit(event, |tree| {
            let removed = tree.add_contributor(id, contributor)?;
            let change = Change {
                touched: vec![id.to_string()],
                structural: !removed.is_empty(),
                removed,
            };
            Ok(((), change))
        })
        .await
    }

    /// Returns whether `contributor` was declared on `id`.
    pub async fn remove_contributor(&self, id: &str, contributor: &str) -> Result<bool> {
        let event = TreeEvent::new(TreeEventKind::ContributorRemoved, self.root_id(), id)
            .with_payload(json!({ "contributor": contributor }));
        self.commit(event, |tree| {
            let removed = tree.remove_contributor(id, contributor)?;
            Ok((removed, Change::touching(id)))
        })
        .await
    }

    async fn commit<T>(
        &self,
        event: TreeEvent,
        apply: impl FnOnce(&mut WeightedTree) -> Result<(T, Change)>,
    ) -> Result<T> {
        let inner = &self.inner;
        let (out, new_peers) = {
            let mut guard = inner.state.lock().await;
            if inner.scheduler.is_shut_down() {
                return Err(RecognitionError::InvalidState(format!(
                    "hierarchy '{}' is shut down",
                    inner.root_id
                )));
            }
            let state = &mut *guard;
            let (out, change) = apply(&mut state.tree)?;
            state.bump_revision();
            let new_peers = inner.sync_peers(state).await;
            inner.stage_change(&state.tree, &change).await;
            inner.cache.invalidate_all();
            // Emitted under the lock so events follow the order mutations applied
            inner.events.emit(event);
            (out, new_peers)
        };

        inner.refresh_reciprocals(&new_peers).await;
        inner.scheduler.schedule(PUBLISH_KEY);
        Ok(out)
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    pub async fn fulfilled(&self, id: &str) -> Result<f64> {
        let state = self.inner.state.lock().await;
        state.tree.node(id)?;
        Ok(fulfillment::fulfilled(&state.tree, id))
    }

    pub async fn desire(&self, id: &str) -> Result<f64> {
        let state = self.inner.state.lock().await;
        state.tree.node(id)?;
        Ok(fulfillment::desire(&state.tree, id))
    }

    pub async fn weight(&self, id: &str) -> Result<f64> {
        let state = self.inner.state.lock().await;
        state.tree.node(id)?;
        Ok(state.tree.weight(id))
    }

    pub async fn share_of_parent(&self, id: &str) -> Result<f64> {
        let state = self.inner.state.lock().await;
        state.tree.node(id)?;
        Ok(state.tree.share_of_parent(id))
    }

    /// One-directional recognition of `peer`, cached.
    pub async fn share_of_general_fulfillment(&self, peer: &str) -> f64 {
        let inner = &self.inner;
        let state = inner.state.lock().await;
        let key = QueryKey::new(inner.root_id.as_str(), QueryOp::ShareOfGeneralFulfillment, peer);
        inner.cache.scalar(key, || {
            recognition::share_of_general_fulfillment(&state.tree, peer)
        })
    }

    /// `min(our share toward peer, peer's share toward us)`, cached.
    pub async fn mutual_fulfillment(&self, peer: &str) -> f64 {
        let inner = &self.inner;
        let mut guard = inner.state.lock().await;
        let state = &mut *guard;
        let key = QueryKey::new(inner.root_id.as_str(), QueryOp::MutualFulfillment, peer);
        inner.cache.scalar(key, || state.mutual_value(peer))
    }

    /// Normalized mutual recognition toward every contributor, cached.
    pub async fn mutual_fulfillment_distribution(&self) -> ShareMap {
        let inner = &self.inner;
        let key = QueryKey::new(inner.root_id.as_str(), QueryOp::MutualDistribution, "");
        if let Some(cached) = inner.cache.shares(&key) {
            return (*cached).clone();
        }

        let state = inner.state.lock().await;
        let distribution = recognition::mutual_fulfillment_distribution(
            &state.tree,
            &state.reciprocal_snapshot(),
        );
        inner.cache.insert_shares(key, distribution.clone());
        distribution
    }

    /// Recognition share toward every contributor (the published map).
    pub async fn recognition_map(&self) -> ShareMap {
        recognition::recognition_map(&self.inner.state.lock().await.tree)
    }

    /// Network-wide distribution over `depth` transitive hops, cached.
    pub async fn social_distribution(&self, depth: usize) -> ShareMap {
        let inner = &self.inner;
        let key = QueryKey::new(
            inner.root_id.as_str(),
            QueryOp::SocialDistribution,
            depth.to_string(),
        );
        if let Some(cached) = inner.cache.shares(&key) {
            return (*cached).clone();
        }
        let social = self.social_distribution_detailed(depth).await;
        inner.cache.insert_shares(key, social.shares.clone());
        social.shares
    }

    /// Uncached traversal including hop counts and unresolved peers.
    pub async fn social_distribution_detailed(&self, depth: usize) -> SocialDistribution {
        let inner = &self.inner;
        let direct = self.mutual_fulfillment_distribution().await;
        let source = StoreDistributionSource::new(
            inner.store.clone(),
            inner.cache.clone(),
            inner.config.read_timeout,
        );
        let config = TraversalConfig {
            max_depth: depth,
            ..inner.config.traversal.clone()
        };
        recognition::social_distribution(&inner.root_id, &direct, &source, &config).await
    }

    // ========================================================================
    // Peer updates and lifecycle
    // ========================================================================

    /// Apply a peer's published recognition map. Returns false if it was stale,
    /// a duplicate, or from a peer we do not recognize.
    pub async fn apply_reciprocal(&self, peer: &str, published: &PublishedShares) -> bool {
        self.inner.apply_reciprocal(peer, published).await
    }

    /// Publish the recognition map and mutual distribution immediately.
    pub async fn publish_now(&self) -> anyhow::Result<u64> {
        self.inner.publish().await
    }

    /// Write every staged record now. Returns the number of writes.
    pub async fn flush(&self) -> usize {
        self.inner.writer.flush().await
    }

    /// Cancel timers and subscriptions, then flush pending writes. Idempotent.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        {
            // Under the lock, so no commit can link a peer after the drain
            let mut state = inner.state.lock().await;
            inner.scheduler.shutdown();
            for (_, link) in state.peers.drain() {
                link.subscription.cancel();
            }
        }
        inner.writer.shutdown().await;
        let written = inner.writer.flush().await;
        info!(root = %inner.root_id, written, "Hierarchy shut down");
    }
}

impl Change {
    fn touching(id: &str) -> Self {
        Self {
            touched: vec![id.to_string()],
            ..Default::default()
        }
    }
}

impl HierarchyInner {
    /// Link new contributors and drop links to peers no longer recognized.
    ///
    /// Returns the newly linked peers.
    pub(crate) async fn sync_peers(
        self: &Arc<Self>,
        state: &mut HierarchyState,
    ) -> Vec<String> {
        let wanted: BTreeSet<String> = state.tree.directory().contributors().into_iter().collect();

        let stale: Vec<String> = state
            .peers
            .keys()
            .filter(|peer| !wanted.contains(*peer))
            .cloned()
            .collect();
        for peer in stale {
            if let Some(link) = state.peers.remove(&peer) {
                link.subscription.cancel();
                state.cells.dispose(link.mutual);
                state.cells.dispose(link.reciprocal);
                debug!(root = %self.root_id, peer = %peer, "Peer unlinked");
            }
        }

        let mut added = Vec::new();
        for peer in wanted {
            if state.peers.contains_key(&peer) {
                continue;
            }
            match self.link_peer(state, &peer).await {
                Ok(link) => {
                    state.peers.insert(peer.clone(), link);
                    added.push(peer);
                }
                Err(e) => {
                    warn!(root = %self.root_id, peer = %peer, error = %e, "Failed to link peer");
                }
            }
        }
        added
    }

    async fn link_peer(
        self: &Arc<Self>,
        state: &mut HierarchyState,
        peer: &str,
    ) -> anyhow::Result<PeerLink> {
        let path = recognition_path(peer);
        let timeout = self.config.read_timeout;
        let rx = match tokio::time::timeout(timeout, self.store.subscribe(&path)).await {
            Ok(rx) => rx.with_context(|| format!("subscribing to {path}"))?,
            Err(_) => {
                return Err(RecognitionError::StoreTimeout {
                    path: path.clone(),
                    after: timeout,
                }
                .into())
            }
        };

        let weak = Arc::downgrade(self);
        let listener_peer = peer.to_string();
        let subscription = Subscription::spawn(path, rx, move |event: StoreEvent| {
            let weak = weak.clone();
            let peer = listener_peer.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_recognition_event(&peer, event.value).await;
                }
            }
        });

        let reciprocal = state.cells.source(0.0);
        let revision_cell = state.revision_cell;
        let mutual_peer = peer.to_string();
        let mutual = state.cells.derived(move |cells, tree: &WeightedTree| {
            cells.get(revision_cell, tree);
            let theirs = cells.get(reciprocal, tree).unwrap_or(0.0);
            recognition::mutual_fulfillment(tree, &mutual_peer, theirs)
        });
        state.cells.get(mutual, &state.tree);

        let trigger = self.scheduler.downgrade();
        state.cells.observe(mutual, move |_| {
            trigger.schedule(PUBLISH_KEY);
        });

        debug!(root = %self.root_id, peer, "Peer linked");
        Ok(PeerLink {
            reciprocal,
            mutual,
            last_revision: None,
            subscription,
        })
    }

    async fn on_recognition_event(&self, peer: &str, value: Value) {
        if value.is_null() {
            debug!(root = %self.root_id, peer, "Peer cleared its recognition, ignoring");
            return;
        }
        match serde_json::from_value::<PublishedShares>(value) {
            Ok(published) => {
                self.apply_reciprocal(peer, &published).await;
            }
            Err(e) => debug!(root = %self.root_id, peer, error = %e, "Malformed recognition event"),
        }
    }

    /// Initial bounded read of each peer's published recognition.
    pub(crate) async fn refresh_reciprocals(&self, peers: &[String]) {
        let timeout = self.config.read_timeout;
        let reads = peers.iter().map(|peer| async move {
            let published =
                read_json::<PublishedShares>(self.store.as_ref(), &recognition_path(peer), timeout)
                    .await
                    .unwrap_or(None);
            (peer, published)
        });
        for (peer, published) in join_all(reads).await {
            if let Some(published) = published {
                self.apply_reciprocal(peer, &published).await;
            }
        }
    }

    pub(crate) async fn apply_reciprocal(&self, peer: &str, published: &PublishedShares) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(link) = state.peers.get_mut(peer) else {
            debug!(root = %self.root_id, peer, "Recognition from unlinked peer ignored");
            return false;
        };
        if link.last_revision.is_some_and(|last| published.revision <= last) {
            debug!(
                root = %self.root_id,
                peer,
                revision = published.revision,
                "Stale or duplicate recognition dropped"
            );
            return false;
        }
        link.last_revision = Some(published.revision);
        let cell = link.reciprocal;

        let share = published
            .shares
            .get(&self.root_id)
            .copied()
            .unwrap_or(0.0)
            .max(0.0);
        state.cells.set(cell, share, &state.tree);
        debug!(root = %self.root_id, peer, share, revision = published.revision, "Reciprocal share applied");
        true
    }

    async fn stage_change(&self, tree: &WeightedTree, change: &Change) {
        for id in &change.touched {
            let Some(node) = tree.get(id) else {
                continue;
            };
            match serde_json::to_value(NodeRecord::from_node(node)) {
                Ok(value) => self.writer.stage(node_path(&self.root_id, id), value).await,
                Err(e) => warn!(node = %id, error = %e, "Failed to serialize node record"),
            }
        }
        for node in &change.removed {
            self.writer
                .stage(node_path(&self.root_id, &node.id), Value::Null)
                .await;
        }
        if change.structural {
            let mut ids: Vec<&str> = tree.nodes().map(|n| n.id.as_str()).collect();
            ids.sort_unstable();
            self.writer.stage(index_path(&self.root_id), json!(ids)).await;
        }
    }
}
