//! Dependency-tracked reactive cells.
//!
//! A [`ReactiveGraph`] owns source cells (set explicitly) and derived cells
//! (computed from other cells). Reading a cell while a derived cell is being
//! computed records a dependency edge; the graph keeps its own "currently
//! computing" stack, so tracking is scoped to one graph instance.
//!
//! Writing a source notifies its observers synchronously and marks every
//! transitive dependent dirty. Dirty cells without observers recompute lazily
//! on their next read; dirty cells with observers recompute eagerly and notify
//! when their value changed.
//!
//! Derived computations receive a read-only context `C` (for example the tree
//! they summarize) supplied by the caller of `get`/`set`.

use std::sync::Arc;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use tracing::warn;

/// Handle to a cell of a [`ReactiveGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(NodeIndex);

/// Handle to a registered observer.
pub type ObserverId = u64;

type Compute<V, C> = Arc<dyn Fn(&mut ReactiveGraph<V, C>, &C) -> V + Send + Sync>;
type Observer<V> = Box<dyn FnMut(&V) + Send>;

enum CellKind<V, C> {
    Source,
    Derived { compute: Compute<V, C>, dirty: bool },
}

struct Cell<V, C> {
    value: Option<V>,
    kind: CellKind<V, C>,
    observers: Vec<(ObserverId, Observer<V>)>,
}

/// Single-threaded dependency graph of reactive cells.
///
/// Edges point from a dependency to its dependent.
pub struct ReactiveGraph<V, C> {
    graph: StableDiGraph<Cell<V, C>, ()>,
    computing: Vec<NodeIndex>,
    next_observer: ObserverId,
}

impl<V, C> ReactiveGraph<V, C>
where
    V: Clone + PartialEq + Send + 'static,
    C: 'static,
{
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            computing: Vec::new(),
            next_observer: 0,
        }
    }

    /// Create a source cell holding `value`.
    pub fn source(&mut self, value: V) -> CellId {
        CellId(self.graph.add_node(Cell {
            value: Some(value),
            kind: CellKind::Source,
            observers: Vec::new(),
        }))
    }

    /// Create a derived cell. It is computed on first read.
    pub fn derived<F>(&mut self, compute: F) -> CellId
    where
        F: Fn(&mut ReactiveGraph<V, C>, &C) -> V + Send + Sync + 'static,
    {
        CellId(self.graph.add_node(Cell {
            value: None,
            kind: CellKind::Derived {
                compute: Arc::new(compute),
                dirty: true,
            },
            observers: Vec::new(),
        }))
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.graph.contains_node(id.0)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn is_dirty(&self, id: CellId) -> bool {
        matches!(
            self.graph.node_weight(id.0).map(|c| &c.kind),
            Some(CellKind::Derived { dirty: true, .. })
        )
    }

    /// Cells that read `id` during their last computation.
    pub fn dependents(&self, id: CellId) -> Vec<CellId> {
        self.graph
            .neighbors_directed(id.0, Direction::Outgoing)
            .map(CellId)
            .collect()
    }

    /// Current value of `id`, recomputing it first if dirty.
    ///
    /// Returns `None` for disposed cells. Inside a derived computation the
    /// read is recorded as a dependency of the computing cell.
    pub fn get(&mut self, id: CellId, ctx: &C) -> Option<V> {
        if !self.graph.contains_node(id.0) {
            return None;
        }
        if let Some(&reader) = self.computing.last() {
            if reader != id.0 {
                self.graph.update_edge(id.0, reader, ());
            }
        }
        if self.computing.contains(&id.0) {
            warn!(cell = ?id, "Reactive cycle detected, returning previous value");
            return self.graph[id.0].value.clone();
        }
        if self.is_dirty(id) {
            self.recompute(id.0, ctx);
        }
        self.graph[id.0].value.clone()
    }

    /// Last computed value without recomputation or tracking.
    pub fn peek(&self, id: CellId) -> Option<V> {
        self.graph.node_weight(id.0).and_then(|c| c.value.clone())
    }

    fn recompute(&mut self, idx: NodeIndex, ctx: &C) {
        let compute = match &self.graph[idx].kind {
            CellKind::Derived { compute, .. } => compute.clone(),
            CellKind::Source => return,
        };

        // Dependencies are re-recorded on every computation
        let stale: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }

        self.computing.push(idx);
        let value = compute(self, ctx);
        self.computing.pop();

        let cell = &mut self.graph[idx];
        cell.value = Some(value);
        if let CellKind::Derived { dirty, .. } = &mut cell.kind {
            *dirty = false;
        }
    }

    /// Write a source cell, notify its observers and propagate invalidation.
    ///
    /// Returns false if `id` is not a live source cell.
    pub fn set(&mut self, id: CellId, value: V, ctx: &C) -> bool {
        match self.graph.node_weight_mut(id.0) {
            Some(cell) if matches!(cell.kind, CellKind::Source) => {
                cell.value = Some(value);
            }
            _ => return false,
        }
        self.notify(id.0);
        self.invalidate_dependents(id.0, ctx);
        true
    }

    fn notify(&mut self, idx: NodeIndex) {
        let Cell {
            value, observers, ..
        } = &mut self.graph[idx];
        if let Some(value) = value.as_ref() {
            for (_, observer) in observers.iter_mut() {
                observer(value);
            }
        }
    }

    fn invalidate_dependents(&mut self, idx: NodeIndex, ctx: &C) {
        let mut dependents = Vec::new();
        let mut bfs = Bfs::new(&self.graph, idx);
        while let Some(n) = bfs.next(&self.graph) {
            if n != idx {
                dependents.push(n);
            }
        }

        for &n in &dependents {
            if let CellKind::Derived { dirty, .. } = &mut self.graph[n].kind {
                *dirty = true;
            }
        }

        let observed: Vec<(NodeIndex, Option<V>)> = dependents
            .into_iter()
            .filter(|n| !self.graph[*n].observers.is_empty())
            .map(|n| (n, self.graph[n].value.clone()))
            .collect();

        for (n, _) in &observed {
            if self.is_dirty(CellId(*n)) {
                self.recompute(*n, ctx);
            }
        }
        for (n, previous) in observed {
            if self.graph[n].value != previous {
                self.notify(n);
            }
        }
    }

    /// Register `observer`, called with every new value of `id`.
    pub fn observe<F>(&mut self, id: CellId, observer: F) -> Option<ObserverId>
    where
        F: FnMut(&V) + Send + 'static,
    {
        let cell = self.graph.node_weight_mut(id.0)?;
        let observer_id = self.next_observer;
        self.next_observer += 1;
        cell.observers.push((observer_id, Box::new(observer)));
        Some(observer_id)
    }

    pub fn unobserve(&mut self, id: CellId, observer: ObserverId) -> bool {
        let Some(cell) = self.graph.node_weight_mut(id.0) else {
            return false;
        };
        let before = cell.observers.len();
        cell.observers.retain(|(oid, _)| *oid != observer);
        cell.observers.len() != before
    }

    /// Remove a cell. Its dependents become dirty and read `None` for it.
    pub fn dispose(&mut self, id: CellId) -> bool {
        let dependents = self.dependents(id);
        if self.graph.remove_node(id.0).is_none() {
            return false;
        }
        for dep in dependents {
            if let CellKind::Derived { dirty, .. } = &mut self.graph[dep.0].kind {
                *dirty = true;
            }
        }
        true
    }
}

impl<V, C> Default for ReactiveGraph<V, C>
where
    V: Clone + PartialEq + Send + 'static,
    C: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
