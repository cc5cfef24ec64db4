//! Dirty tracker (C2): per-node dirty flag with priority level, dependent
//! propagation, and UI-invalidation regions.
//!
//! # Monotonic upgrade rule
//!
//! `mark(id, level)` always sets `dirty_level ← max(old_level, level)`. A
//! `Normal` mark arriving after a `Critical` mark that hasn't been cleared
//! yet must not demote the node back to `Normal` — see ID2.
//!
//! # Auto-registration
//!
//! Per the open question in the distilled spec, `mark` on an id that was
//! never `register`ed auto-registers it first rather than failing.

use crate::graph::DependencyGraph;
use crate::node::NodeId;
use crate::types::{MergedRegion, Priority, Rect, Region, TrackerStatistics};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Dirty level. Ordered `None < Normal < High < Critical` so `max()` gives
/// the monotonic-upgrade behavior the spec calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirtyLevel {
    None,
    Normal,
    High,
    Critical,
}

impl Default for DirtyLevel {
    fn default() -> Self {
        DirtyLevel::None
    }
}

#[derive(Debug, Clone)]
struct DirtyState {
    is_dirty: bool,
    level: DirtyLevel,
    last_modified_at: Instant,
    last_evaluated_at: Option<Instant>,
    registered_at: Instant,
}

impl DirtyState {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            is_dirty: true,
            level: DirtyLevel::Normal,
            last_modified_at: now,
            last_evaluated_at: None,
            registered_at: now,
        }
    }
}

struct TrackerState {
    states: HashMap<NodeId, DirtyState>,
    regions: HashMap<NodeId, Region>,
}

impl TrackerState {
    fn new() -> Self {
        Self { states: HashMap::new(), regions: HashMap::new() }
    }

    fn ensure_registered(&mut self, id: &NodeId) -> &mut DirtyState {
        self.states.entry(id.clone()).or_insert_with(DirtyState::fresh)
    }
}

/// The dirty tracker component (C2). Every method acquires and releases
/// the single component lock within its own body (§4.2 concurrency note).
pub struct DirtyTracker {
    inner: Mutex<TrackerState>,
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self { inner: Mutex::new(TrackerState::new()) }
    }

    /// Idempotent: re-registering an already-known node leaves its current
    /// dirty state untouched.
    pub fn register(&self, id: NodeId) {
        let mut state = self.inner.lock().unwrap();
        state.states.entry(id).or_insert_with(DirtyState::fresh);
    }

    pub fn unregister(&self, id: &NodeId) {
        let mut state = self.inner.lock().unwrap();
        state.states.remove(id);
        state.regions.remove(id);
    }

    /// Marks `id` dirty at least at `level`, auto-registering it first if
    /// it was never seen before.
    pub fn mark(&self, id: &NodeId, level: DirtyLevel) {
        let mut state = self.inner.lock().unwrap();
        let entry = state.ensure_registered(id);
        entry.is_dirty = true;
        entry.level = entry.level.max(level);
        entry.last_modified_at = Instant::now();
    }

    /// Marks every id in `ids` at `level`. Returns the number of nodes that
    /// transitioned from clean to dirty (a node already dirty, even at a
    /// lower level, is not counted again).
    pub fn mark_batch(&self, ids: &[NodeId], level: DirtyLevel) -> usize {
        let mut state = self.inner.lock().unwrap();
        let mut newly_dirty = 0;
        for id in ids {
            let was_dirty = state.states.get(id).map_or(false, |s| s.is_dirty);
            let entry = state.ensure_registered(id);
            entry.is_dirty = true;
            entry.level = entry.level.max(level);
            entry.last_modified_at = Instant::now();
            if !was_dirty {
                newly_dirty += 1;
            }
        }
        newly_dirty
    }

    /// Marks `id` and every transitive successor in `graph` at `level`.
    /// The successor set is a one-time snapshot: later graph mutations have
    /// no retroactive effect on this call.
    pub fn mark_with_dependents(&self, id: &NodeId, level: DirtyLevel, graph: &DependencyGraph) {
        let successors = graph.transitive_successors(id);
        let mut ids = Vec::with_capacity(successors.len() + 1);
        ids.push(id.clone());
        ids.extend(successors);
        self.mark_batch(&ids, level);
    }

    /// Idempotent.
    pub fn clear(&self, id: &NodeId) {
        let mut state = self.inner.lock().unwrap();
        if let Some(entry) = state.states.get_mut(id) {
            entry.is_dirty = false;
            entry.level = DirtyLevel::None;
            entry.last_evaluated_at = Some(Instant::now());
        }
    }

    pub fn clear_batch(&self, ids: &[NodeId]) {
        let mut state = self.inner.lock().unwrap();
        let now = Instant::now();
        for id in ids {
            if let Some(entry) = state.states.get_mut(id) {
                entry.is_dirty = false;
                entry.level = DirtyLevel::None;
                entry.last_evaluated_at = Some(now);
            }
        }
    }

    pub fn clear_all(&self) {
        let mut state = self.inner.lock().unwrap();
        let now = Instant::now();
        for entry in state.states.values_mut() {
            entry.is_dirty = false;
            entry.level = DirtyLevel::None;
            entry.last_evaluated_at = Some(now);
        }
    }

    pub fn is_dirty(&self, id: &NodeId) -> bool {
        self.inner.lock().unwrap().states.get(id).map_or(false, |s| s.is_dirty)
    }

    pub fn dirty_level(&self, id: &NodeId) -> DirtyLevel {
        self.inner.lock().unwrap().states.get(id).map_or(DirtyLevel::None, |s| s.level)
    }

    pub fn dirty_nodes(&self) -> HashSet<NodeId> {
        self.inner
            .lock()
            .unwrap()
            .states
            .iter()
            .filter(|(_, s)| s.is_dirty)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn dirty_nodes_by_level(&self, level: DirtyLevel) -> HashSet<NodeId> {
        self.inner
            .lock()
            .unwrap()
            .states
            .iter()
            .filter(|(_, s)| s.is_dirty && s.level == level)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.inner.lock().unwrap().states.values().filter(|s| s.is_dirty).count()
    }

    /// Nodes that have been dirty for longer than `max_age`.
    pub fn stale_dirty_nodes(&self, max_age: Duration) -> HashSet<NodeId> {
        let now = Instant::now();
        self.inner
            .lock()
            .unwrap()
            .states
            .iter()
            .filter(|(_, s)| s.is_dirty && now.duration_since(s.last_modified_at) >= max_age)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn statistics(&self) -> TrackerStatistics {
        let state = self.inner.lock().unwrap();
        TrackerStatistics {
            registered_count: state.states.len(),
            dirty_count: state.states.values().filter(|s| s.is_dirty).count(),
        }
    }

    // ── Region sub-API ───────────────────────────────────────────────

    pub fn register_region(&self, id: NodeId, rect: Rect, priority: Priority) {
        let mut state = self.inner.lock().unwrap();
        state.regions.insert(id, Region { rect, priority });
    }

    /// Marks every node whose registered region intersects `rect` dirty at
    /// `Normal` level.
    pub fn mark_region_dirty(&self, rect: Rect) {
        let ids: Vec<NodeId> = {
            let state = self.inner.lock().unwrap();
            state.regions.iter().filter(|(_, r)| r.rect.intersects(&rect)).map(|(id, _)| id.clone()).collect()
        };
        self.mark_batch(&ids, DirtyLevel::Normal);
    }

    /// Regions of currently-dirty nodes that overlap `viewport`.
    pub fn dirty_regions_in_viewport(&self, viewport: Rect) -> Vec<Region> {
        let state = self.inner.lock().unwrap();
        state
            .regions
            .iter()
            .filter(|(id, r)| {
                r.rect.intersects(&viewport) && state.states.get(*id).map_or(false, |s| s.is_dirty)
            })
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Same as [`Self::dirty_regions_in_viewport`], but regions whose
    /// rectangles transitively overlap are grouped into one
    /// [`MergedRegion`] per connected component; the merged priority is the
    /// maximum of the group. Grouping keeps every input rectangle instead of
    /// collapsing them into a bounding box, so the union of a group's
    /// `rects` is always exactly the union of the regions it replaces —
    /// `MergedRegion::area` gives that area directly.
    pub fn merged_dirty_regions_in_viewport(&self, viewport: Rect) -> Vec<MergedRegion> {
        let regions = self.dirty_regions_in_viewport(viewport);
        let n = regions.len();

        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], x: usize) -> usize {
            if parent[x] != x {
                parent[x] = find(parent, parent[x]);
            }
            parent[x]
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if regions[i].rect.intersects(&regions[j].rect) {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[ri] = rj;
                    }
                }
            }
        }

        let mut groups: HashMap<usize, MergedRegion> = HashMap::new();
        for i in 0..n {
            let root = find(&mut parent, i);
            let group = groups.entry(root).or_insert_with(|| MergedRegion { rects: Vec::new(), priority: regions[i].priority });
            group.rects.push(regions[i].rect);
            group.priority = group.priority.max(regions[i].priority);
        }
        groups.into_values().collect()
    }
}
