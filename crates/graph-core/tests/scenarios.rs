//! End-to-end scenarios, encoded directly from §8's six concrete examples.

use graph_core::cache::MemoizationCache;
use graph_core::dirty::DirtyTracker;
use graph_core::error::ErrorKind;
use graph_core::evaluator::Evaluator;
use graph_core::graph::DependencyGraph;
use graph_core::node::{NodeCapability, NodeEvalError, NodeId, NodeSignature, NodeValue, ParamValue};
use graph_core::scheduler::{AudioEvent, AvQueueScheduler};
use graph_core::types::{CacheConfig, EvaluatorConfig, Priority, SchedulerConfig};
use std::sync::Arc;
use std::time::Instant;

struct ConstNode {
    id: NodeId,
    value: f64,
    deps: Vec<NodeId>,
}

impl NodeCapability for ConstNode {
    fn id(&self) -> NodeId {
        self.id.clone()
    }
    fn signature(&self) -> NodeSignature {
        NodeSignature::new().with_param("value", ParamValue::Float(self.value)).with_dependencies(self.deps.clone())
    }
    fn evaluate(&mut self) -> Result<NodeValue, NodeEvalError> {
        Ok(NodeValue::Scalar(self.value))
    }
}

fn make_node(id: &str, value: f64, deps: &[&str]) -> Box<ConstNode> {
    Box::new(ConstNode {
        id: NodeId::from(id),
        value,
        deps: deps.iter().map(|d| NodeId::from(*d)).collect(),
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

fn wire_abc(ev: &Evaluator) {
    ev.register_node(make_node("A", 1.0, &[])).unwrap();
    ev.register_node(make_node("B", 2.0, &["A"])).unwrap();
    ev.register_node(make_node("C", 3.0, &["B"])).unwrap();
    ev.add_edge(&NodeId::from("B"), &NodeId::from("A")).unwrap();
    ev.add_edge(&NodeId::from("C"), &NodeId::from("B")).unwrap();
}

// 1. Linear chain.
#[test]
fn scenario_linear_chain() {
    let ev = make_evaluator();
    wire_abc(&ev);
    ev.tracker().mark(&NodeId::from("A"), graph_core::DirtyLevel::Normal);

    assert_eq!(ev.graph().topological_order(), vec![NodeId::from("A"), NodeId::from("B"), NodeId::from("C")]);

    let result = ev.evaluate_all().unwrap();
    assert_eq!(result.evaluated_count, 3);
    assert!(result.all_succeeded);
    assert_eq!(ev.cache().statistics().size, 3);
}

// 2. Incremental propagation.
#[test]
fn scenario_incremental_propagation() {
    let ev = make_evaluator();
    wire_abc(&ev);
    ev.evaluate_all().unwrap();

    ev.unregister_node(&NodeId::from("A"));
    ev.register_node(make_node("A", 42.0, &[])).unwrap();
    ev.add_edge(&NodeId::from("B"), &NodeId::from("A")).unwrap();

    let result = ev.evaluate_incremental(&[NodeId::from("A")]).unwrap();
    assert_eq!(result.evaluated_count, 3);
    assert_eq!(result.cached_count, 0);
}

// 3. No-op incremental.
#[test]
fn scenario_noop_incremental() {
    let ev = make_evaluator();
    wire_abc(&ev);
    ev.evaluate_all().unwrap();

    let result = ev.evaluate_incremental(&[NodeId::from("A")]).unwrap();
    assert_eq!(result.cached_count, 3);
}

// 4. Cycle rejection.
#[test]
fn scenario_cycle_rejection() {
    let ev = make_evaluator();
    wire_abc(&ev);

    let err = ev.add_edge(&NodeId::from("A"), &NodeId::from("C")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CycleDetected);
    assert_eq!(ev.graph().topological_order(), vec![NodeId::from("A"), NodeId::from("B"), NodeId::from("C")]);
}

fn audio_event(priority: Priority) -> AudioEvent {
    AudioEvent {
        timestamp: Instant::now(),
        priority,
        kind: "tone".into(),
        payload: Vec::new(),
        intensity: 1.0,
        frequency: 440.0,
    }
}

// 5. Scheduler priority.
#[test]
fn scenario_scheduler_priority() {
    let sched = AvQueueScheduler::new(SchedulerConfig {
        target_frame_rate: 60,
        max_queue_depth: 100,
        initial_batch_size: 4,
    });

    sched.queue_audio(audio_event(Priority::Low)).unwrap();
    sched.queue_audio(audio_event(Priority::Normal)).unwrap();
    sched.queue_audio(audio_event(Priority::Critical)).unwrap();
    sched.queue_audio(audio_event(Priority::High)).unwrap();
    sched.queue_audio(audio_event(Priority::Low)).unwrap();

    let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
    let delivered_clone = Arc::clone(&delivered);
    sched.set_audio_handler(move |e| delivered_clone.lock().unwrap().push(e.priority));

    let stats = sched.process_frame();
    assert_eq!(stats.audio_drained, 4);
    assert_eq!(
        *delivered.lock().unwrap(),
        vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]
    );
    assert_eq!(sched.statistics().pending_audio, 1);
}

// 6. Backpressure eviction.
#[test]
fn scenario_backpressure_eviction() {
    let sched = AvQueueScheduler::new(SchedulerConfig { target_frame_rate: 60, max_queue_depth: 3, initial_batch_size: 32 });

    sched.queue_audio(audio_event(Priority::Low)).unwrap();
    sched.queue_audio(audio_event(Priority::Low)).unwrap();
    sched.queue_audio(audio_event(Priority::Low)).unwrap();
    sched.queue_audio(audio_event(Priority::Critical)).unwrap();

    let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
    let delivered_clone = Arc::clone(&delivered);
    sched.set_audio_handler(move |e| delivered_clone.lock().unwrap().push(e.priority));
    let stats = sched.process_frame();

    assert_eq!(stats.audio_drained, 3);
    assert_eq!(*delivered.lock().unwrap(), vec![Priority::Critical, Priority::Low, Priority::Low]);
}
