//! Topological evaluator (C4): drives one evaluation pass over a set of
//! nodes, coordinating the dependency graph, dirty tracker, and cache.
//!
//! # Composition order
//!
//! Per §5, a composed operation here touches the dirty tracker, then the
//! graph, then the cache — `(C2 read, C1 read, C3 read/write)` — but since
//! each of those components locks and unlocks internally on every method
//! call, no deadlock ordering discipline is actually required of this
//! caller; the order below just matches the spec's documented composition
//! for readability.

use crate::cache::{Lookup, MemoizationCache};
use crate::dirty::{DirtyLevel, DirtyTracker};
use crate::error::{CoreError, ErrorKind};
use crate::graph::DependencyGraph;
use crate::node::{NodeCapability, NodeId};
use crate::types::{EvalKind, EvaluationResult, EvaluatorConfig, EvaluatorMetrics};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// The topological evaluator component (C4).
pub struct Evaluator {
    graph: Arc<DependencyGraph>,
    tracker: Arc<DirtyTracker>,
    cache: Arc<MemoizationCache>,
    nodes: Mutex<HashMap<NodeId, Box<dyn NodeCapability>>>,
    /// Nodes that have produced at least one successful result this
    /// session (the data model's `is_evaluated`). Persistent across passes
    /// — a transient per-pass failure does not clear it.
    evaluated: Mutex<HashSet<NodeId>>,
    config: EvaluatorConfig,
    metrics: Mutex<EvaluatorMetrics>,
}

impl Evaluator {
    pub fn new(
        graph: Arc<DependencyGraph>,
        tracker: Arc<DirtyTracker>,
        cache: Arc<MemoizationCache>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            graph,
            tracker,
            cache,
            nodes: Mutex::new(HashMap::new()),
            evaluated: Mutex::new(HashSet::new()),
            config,
            metrics: Mutex::new(EvaluatorMetrics::default()),
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &MemoizationCache {
        &self.cache
    }

    /// Registers a host-supplied node: adds it to the dependency graph and
    /// the dirty tracker (dirty at `Normal`, per D1), then stores its
    /// capability record.
    pub fn register_node(&self, node: Box<dyn NodeCapability>) -> Result<(), CoreError> {
        let id = node.id();
        self.graph.add_node(id.clone())?;
        self.tracker.register(id.clone());
        self.nodes.lock().unwrap().insert(id, node);
        Ok(())
    }

    /// Unregisters a node: cascades to the graph (incident edges), the
    /// dirty tracker, and the cache.
    pub fn unregister_node(&self, id: &NodeId) {
        self.graph.remove_node(id);
        self.tracker.unregister(id);
        self.cache.invalidate(id);
        self.nodes.lock().unwrap().remove(id);
        self.evaluated.lock().unwrap().remove(id);
    }

    pub fn add_edge(&self, from: &NodeId, to: &NodeId) -> Result<(), CoreError> {
        self.graph.add_edge(from, to)
    }

    pub fn remove_edge(&self, from: &NodeId, to: &NodeId) {
        self.graph.remove_edge(from, to)
    }

    /// Evaluates every registered node in topological order.
    pub fn evaluate_all(&self) -> Result<EvaluationResult, CoreError> {
        let order = self.graph.topological_order();
        self.run_pass(EvalKind::Full, order)
    }

    /// Computes the affected set (`sources` ∪ transitive successors),
    /// marks it dirty, and evaluates in topological order restricted to
    /// that set plus any currently-dirty ancestor of an affected node.
    pub fn evaluate_incremental(&self, sources: &[NodeId]) -> Result<EvaluationResult, CoreError> {
        let mut affected: HashSet<NodeId> = sources.iter().cloned().collect();
        for src in sources {
            affected.extend(self.graph.transitive_successors(src));
        }

        let to_mark: Vec<NodeId> = affected.iter().cloned().collect();
        self.tracker.mark_batch(&to_mark, DirtyLevel::Normal);

        let eval_set = self.expand_with_dirty_ancestors(&affected);
        let order = self.graph.topological_order_restricted(&eval_set);
        self.run_pass(EvalKind::Incremental, order)
    }

    /// Evaluates `id`, preceded by any currently-dirty ancestor of `id`.
    pub fn evaluate_node(&self, id: &NodeId) -> Result<EvaluationResult, CoreError> {
        let mut base = HashSet::new();
        base.insert(id.clone());
        let eval_set = self.expand_with_dirty_ancestors(&base);
        let order = self.graph.topological_order_restricted(&eval_set);
        self.run_pass(EvalKind::Single, order)
    }

    pub fn metrics(&self) -> EvaluatorMetrics {
        self.metrics.lock().unwrap().clone()
    }

    fn expand_with_dirty_ancestors(&self, affected: &HashSet<NodeId>) -> HashSet<NodeId> {
        let mut eval_set = affected.clone();
        for id in affected {
            for ancestor in self.graph.transitive_predecessors(id) {
                if self.tracker.is_dirty(&ancestor) {
                    eval_set.insert(ancestor);
                }
            }
        }
        eval_set
    }

    fn run_pass(&self, kind: EvalKind, order: Vec<NodeId>) -> Result<EvaluationResult, CoreError> {
        let version_before = self.graph.version();
        let mut result = EvaluationResult::empty(kind);
        result.started_at = Instant::now();

        let mut nodes = self.nodes.lock().unwrap();
        let mut evaluated = self.evaluated.lock().unwrap();

        for id in &order {
            let predecessors = self.graph.predecessors(id);

            let signature = {
                let node = match nodes.get(id) {
                    Some(n) => n,
                    None => {
                        log::error!("corrupt graph: '{id}' appears in topo order but is not registered");
                        return Err(CoreError::new(
                            ErrorKind::CorruptGraph,
                            format!("node '{}' referenced by an edge but not registered", id),
                        ));
                    }
                };
                node.signature()
            };

            match self.cache.lookup(id, &signature) {
                Lookup::Hit(_) => {
                    log::trace!("cache hit for '{id}'");
                    self.tracker.clear(id);
                    evaluated.insert(id.clone());
                    result.cached_count += 1;
                    continue;
                }
                Lookup::Miss => {}
            }

            if !predecessors.iter().all(|p| evaluated.contains(p)) {
                log::error!("dependency not evaluated before '{id}' — aborting pass");
                return Err(CoreError::new(
                    ErrorKind::DependencyNotEvaluated,
                    format!("a predecessor of '{}' was not evaluated before it", id),
                ));
            }

            let node = nodes.get_mut(id).unwrap();
            let node_start = Instant::now();
            let outcome = node.evaluate();
            let elapsed = node_start.elapsed();

            match outcome {
                Ok(value) => {
                    self.cache.store(id.clone(), signature, value);
                    self.tracker.clear(id);
                    evaluated.insert(id.clone());
                    result.evaluated_count += 1;
                    result.per_node_durations.push((id.clone(), elapsed));
                }
                Err(e) => {
                    log::warn!("node '{id}' evaluation failed: {e}");
                    result.failed_count += 1;
                    if self.config.halt_on_first_failure {
                        result.halted_early = true;
                        break;
                    }
                }
            }
        }
        drop(nodes);
        drop(evaluated);

        if self.graph.version() != version_before {
            log::error!("graph mutated during evaluation pass");
            return Err(CoreError::new(
                ErrorKind::GraphMutatedDuringEvaluation,
                "dependency graph structure changed while a pass was in flight".to_string(),
            ));
        }

        result.ended_at = Instant::now();
        result.total_duration = result.ended_at.duration_since(result.started_at);
        result.all_succeeded = result.failed_count == 0;

        log::debug!(
            "evaluation pass ({:?}): {} evaluated, {} cached, {} failed in {:?}",
            result.kind,
            result.evaluated_count,
            result.cached_count,
            result.failed_count,
            result.total_duration
        );

        let mut metrics = self.metrics.lock().unwrap();
        metrics.total_passes += 1;
        metrics.total_evaluated += result.evaluated_count as u64;
        metrics.total_cached += result.cached_count as u64;
        metrics.total_failed += result.failed_count as u64;
        metrics.last_result = Some(result.clone());

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeEvalError, NodeSignature, NodeValue, ParamValue};
    use crate::types::CacheConfig;

    struct ConstNode {
        id: NodeId,
        value: f64,
        deps: Vec<NodeId>,
        fail: bool,
    }

    impl NodeCapability for ConstNode {
        fn id(&self) -> NodeId {
            self.id.clone()
        }
        fn signature(&self) -> NodeSignature {
            NodeSignature::new()
                .with_param("value", ParamValue::Float(self.value))
                .with_dependencies(self.deps.clone())
        }
        fn evaluate(&mut self) -> Result<NodeValue, NodeEvalError> {
            if self.fail {
                Err(NodeEvalError("boom".into()))
            } else {
                Ok(NodeValue::Scalar(self.value))
            }
        }
    }

    fn node(id: &str, value: f64, deps: &[&str]) -> Box<ConstNode> {
        Box::new(ConstNode {
            id: NodeId::from(id),
            value,
            deps: deps.iter().map(|d| NodeId::from(*d)).collect(),
            fail: false,
        })
    }

    fn make_evaluator() -> Evaluator {
        Evaluator::new(
            Arc::new(DependencyGraph::new()),
            Arc::new(DirtyTracker::new()),
            Arc::new(MemoizationCache::new(CacheConfig::default())),
            EvaluatorConfig::default(),
        )
    }

    #[test]
    fn linear_chain_scenario() {
        let ev = make_evaluator();
        ev.register_node(node("A", 1.0, &[])).unwrap();
        ev.register_node(node("B", 2.0, &["A"])).unwrap();
        ev.register_node(node("C", 3.0, &["B"])).unwrap();
        ev.add_edge(&NodeId::from("B"), &NodeId::from("A")).unwrap();
        ev.add_edge(&NodeId::from("C"), &NodeId::from("B")).unwrap();

        let result = ev.evaluate_all().unwrap();
        assert_eq!(result.evaluated_count, 3);
        assert!(result.all_succeeded);
        assert_eq!(ev.cache().statistics().size, 3);
    }

    #[test]
    fn incremental_propagation_reevaluates_chain() {
        let ev = make_evaluator();
        ev.register_node(node("A", 1.0, &[])).unwrap();
        ev.register_node(node("B", 2.0, &["A"])).unwrap();
        ev.register_node(node("C", 3.0, &["B"])).unwrap();
        ev.add_edge(&NodeId::from("B"), &NodeId::from("A")).unwrap();
        ev.add_edge(&NodeId::from("C"), &NodeId::from("B")).unwrap();
        ev.evaluate_all().unwrap();

        // Change A's signature (simulate by re-registering with new value).
        ev.unregister_node(&NodeId::from("A"));
        ev.register_node(node("A", 99.0, &[])).unwrap();
        ev.add_edge(&NodeId::from("B"), &NodeId::from("A")).unwrap();

        let result = ev.evaluate_incremental(&[NodeId::from("A")]).unwrap();
        assert_eq!(result.evaluated_count, 3);
        assert_eq!(result.cached_count, 0);
    }

    #[test]
    fn no_op_incremental_hits_cache() {
        let ev = make_evaluator();
        ev.register_node(node("A", 1.0, &[])).unwrap();
        ev.register_node(node("B", 2.0, &["A"])).unwrap();
        ev.register_node(node("C", 3.0, &["B"])).unwrap();
        ev.add_edge(&NodeId::from("B"), &NodeId::from("A")).unwrap();
        ev.add_edge(&NodeId::from("C"), &NodeId::from("B")).unwrap();
        ev.evaluate_all().unwrap();

        let result = ev.evaluate_incremental(&[NodeId::from("A")]).unwrap();
        assert_eq!(result.cached_count, 3);
    }

    #[test]
    fn node_failure_is_isolated() {
        let ev = make_evaluator();
        ev.register_node(Box::new(ConstNode {
            id: NodeId::from("A"),
            value: 1.0,
            deps: vec![],
            fail: true,
        }))
        .unwrap();
        let result = ev.evaluate_all().unwrap();
        assert_eq!(result.failed_count, 1);
        assert!(!result.all_succeeded);
        assert!(ev.tracker().is_dirty(&NodeId::from("A")));
    }
}
