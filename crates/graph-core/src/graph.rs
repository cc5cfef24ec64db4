//! Dependency graph (C1): nodes, directed edges, cycle detection, and
//! deterministic topological order.
//!
//! # Design
//!
//! Adjacency is stored as two maps — `deps[id]` (what `id` depends on) and
//! `dependents[id]` (what depends on `id`) — so both `predecessors` and
//! `successors` are O(deg) without a scan. Cycle detection on `add_edge`
//! does a bounded DFS from the prospective *to* node looking for the
//! prospective *from* node along `deps` edges; if found, the new edge would
//! close a cycle and insertion is rejected with the graph left untouched.
//!
//! Every node is stamped with a monotonically increasing registration
//! sequence number. `topological_order` uses this to break ties between
//! simultaneously-ready nodes deterministically — relying on `HashMap`
//! iteration order here (as a naive Kahn's algorithm implementation might)
//! would not satisfy IG3, since hash map iteration order is not guaranteed
//! stable across runs.

use crate::error::{CoreError, ErrorKind};
use crate::node::NodeId;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Mutex;

struct GraphState {
    nodes: HashSet<NodeId>,
    /// id → set of ids that `id` depends on (edge id → dep exists).
    deps: HashMap<NodeId, HashSet<NodeId>>,
    /// id → set of ids that depend on `id`.
    dependents: HashMap<NodeId, HashSet<NodeId>>,
    seq: HashMap<NodeId, u64>,
    next_seq: u64,
    topo_cache: Option<Vec<NodeId>>,
    /// Bumped on every structural mutation. Lets C4 detect the rare case of
    /// a concurrent structural change mid-pass (§5 `GraphMutatedDuringEvaluation`).
    version: u64,
}

impl GraphState {
    fn new() -> Self {
        Self {
            nodes: HashSet::new(),
            deps: HashMap::new(),
            dependents: HashMap::new(),
            seq: HashMap::new(),
            next_seq: 0,
            topo_cache: None,
            version: 0,
        }
    }

    /// DFS along `deps` edges starting at `start`, looking for `target`.
    /// Used to detect whether inserting `from → to` would create a cycle:
    /// called with `start = to`, `target = from`.
    fn reachable(&self, start: &NodeId, target: &NodeId) -> bool {
        if start == target {
            return true;
        }
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(cur) = stack.pop() {
            if !visited.insert(cur.clone()) {
                continue;
            }
            if let Some(next) = self.deps.get(&cur) {
                for n in next {
                    if n == target {
                        return true;
                    }
                    if !visited.contains(n) {
                        stack.push(n.clone());
                    }
                }
            }
        }
        false
    }

    /// Deterministic Kahn's-algorithm topological order over all nodes.
    fn compute_topo_order(&self) -> Vec<NodeId> {
        let mut remaining: HashMap<NodeId, usize> =
            self.nodes.iter().map(|n| (n.clone(), self.deps.get(n).map_or(0, |d| d.len()))).collect();

        let seq_of = |id: &NodeId| -> u64 { *self.seq.get(id).unwrap_or(&u64::MAX) };

        // Min-heap over (seq, NodeId) via Reverse so the lowest sequence
        // number is popped first; ties are impossible since sequence
        // numbers are unique, but NodeId still needs an ordering for the
        // tuple to be comparable, so we order by seq only using a wrapper.
        #[derive(Eq, PartialEq)]
        struct Ready(u64, NodeId);
        impl Ord for Ready {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                other.0.cmp(&self.0)
            }
        }
        impl PartialOrd for Ready {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut heap = BinaryHeap::new();
        for (id, &deg) in &remaining {
            if deg == 0 {
                heap.push(Ready(seq_of(id), id.clone()));
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Ready(_, id)) = heap.pop() {
            order.push(id.clone());
            if let Some(deps) = self.dependents.get(&id) {
                for dependent in deps {
                    if let Some(deg) = remaining.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            heap.push(Ready(seq_of(dependent), dependent.clone()));
                        }
                    }
                }
            }
        }
        order
    }
}

/// The dependency graph component (C1). Internally synchronized: every
/// method acquires and releases the component lock within its own body, so
/// it is always safe to share a `DependencyGraph` behind an `Arc` across
/// threads without the caller doing any locking of its own.
pub struct DependencyGraph {
    inner: Mutex<GraphState>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self { inner: Mutex::new(GraphState::new()) }
    }

    pub fn add_node(&self, id: NodeId) -> Result<(), CoreError> {
        let mut state = self.inner.lock().unwrap();
        if state.nodes.contains(&id) {
            return Err(CoreError::new(
                ErrorKind::AlreadyExists,
                format!("node '{}' is already registered", id),
            ));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.seq.insert(id.clone(), seq);
        state.deps.insert(id.clone(), HashSet::new());
        state.dependents.insert(id.clone(), HashSet::new());
        state.nodes.insert(id);
        state.topo_cache = None;
        state.version += 1;
        Ok(())
    }

    pub fn remove_node(&self, id: &NodeId) {
        let mut state = self.inner.lock().unwrap();
        if !state.nodes.remove(id) {
            return;
        }
        let deps = state.deps.remove(id).unwrap_or_default();
        for dep in &deps {
            if let Some(set) = state.dependents.get_mut(dep) {
                set.remove(id);
            }
        }
        let dependents = state.dependents.remove(id).unwrap_or_default();
        for dependent in &dependents {
            if let Some(set) = state.deps.get_mut(dependent) {
                set.remove(id);
            }
        }
        state.seq.remove(id);
        state.topo_cache = None;
        state.version += 1;
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.lock().unwrap().nodes.contains(id)
    }

    /// Inserts `from → to` ("`from` depends on `to`"). Fails without
    /// mutating state if either endpoint is unregistered or the edge would
    /// create a cycle.
    pub fn add_edge(&self, from: &NodeId, to: &NodeId) -> Result<(), CoreError> {
        let mut state = self.inner.lock().unwrap();
        if !state.nodes.contains(from) || !state.nodes.contains(to) {
            return Err(CoreError::new(
                ErrorKind::UnknownNode,
                format!("add_edge: '{}' or '{}' is not registered", from, to),
            ));
        }
        if state.deps.get(from).map_or(false, |s| s.contains(to)) {
            return Ok(()); // duplicate edge is a no-op
        }
        if state.reachable(to, from) {
            log::warn!("rejected add_edge({from}, {to}): would create a cycle");
            return Err(CoreError::new(
                ErrorKind::CycleDetected,
                format!("edge '{}' -> '{}' would create a cycle", from, to),
            ));
        }
        state.deps.get_mut(from).unwrap().insert(to.clone());
        state.dependents.get_mut(to).unwrap().insert(from.clone());
        state.topo_cache = None;
        state.version += 1;
        Ok(())
    }

    pub fn remove_edge(&self, from: &NodeId, to: &NodeId) {
        let mut state = self.inner.lock().unwrap();
        let removed = state.deps.get_mut(from).map_or(false, |s| s.remove(to));
        if removed {
            if let Some(s) = state.dependents.get_mut(to) {
                s.remove(from);
            }
            state.topo_cache = None;
        state.version += 1;
        }
    }

    /// What `id` depends on.
    pub fn predecessors(&self, id: &NodeId) -> HashSet<NodeId> {
        self.inner.lock().unwrap().deps.get(id).cloned().unwrap_or_default()
    }

    /// What depends on `id`.
    pub fn successors(&self, id: &NodeId) -> HashSet<NodeId> {
        self.inner.lock().unwrap().dependents.get(id).cloned().unwrap_or_default()
    }

    /// Transitive closure of `successors`, via BFS. Used by the dirty
    /// tracker's `mark_with_dependents` and the cache's
    /// `invalidate_with_dependents` — both take this as a borrowed-view
    /// snapshot and do not retain a reference to the graph's topology.
    pub fn transitive_successors(&self, id: &NodeId) -> HashSet<NodeId> {
        let state = self.inner.lock().unwrap();
        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(id.clone());
        while let Some(cur) = queue.pop_front() {
            if let Some(next) = state.dependents.get(&cur) {
                for n in next {
                    if visited.insert(n.clone()) {
                        queue.push_back(n.clone());
                    }
                }
            }
        }
        visited
    }

    /// Transitive closure of `predecessors` (every ancestor of `id`).
    pub fn transitive_predecessors(&self, id: &NodeId) -> HashSet<NodeId> {
        let state = self.inner.lock().unwrap();
        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(id.clone());
        while let Some(cur) = queue.pop_front() {
            if let Some(next) = state.deps.get(&cur) {
                for n in next {
                    if visited.insert(n.clone()) {
                        queue.push_back(n.clone());
                    }
                }
            }
        }
        visited
    }

    /// A linear order over all nodes with every edge going strictly "later
    /// depends on earlier". Deterministic across repeated calls on an
    /// unchanged graph (IG3).
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut state = self.inner.lock().unwrap();
        if let Some(cached) = &state.topo_cache {
            return cached.clone();
        }
        let order = state.compute_topo_order();
        state.topo_cache = Some(order.clone());
        order
    }

    /// A topological order over `subset` alone, preserving relative order
    /// from the full order.
    pub fn topological_order_restricted(&self, subset: &HashSet<NodeId>) -> Vec<NodeId> {
        self.topological_order().into_iter().filter(|id| subset.contains(id)).collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    /// Monotonically increasing counter bumped on every structural mutation
    /// (node/edge add or remove). Used by the evaluator to detect a
    /// concurrent structural change mid-pass.
    pub fn version(&self) -> u64 {
        self.inner.lock().unwrap().version
    }
}
