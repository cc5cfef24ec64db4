//! Node identity, signatures, and the host-supplied node capability.
//!
//! # NodeSignature
//!
//! A structural fingerprint of a node's current inputs, used as the sole
//! cache-key semantic by [`crate::cache::MemoizationCache`]. Two signatures
//! compare equal iff their parameter maps are equal (key and value) and
//! their dependency lists are equal as ordered sequences.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ── NodeId ───────────────────────────────────────────────────────────

/// Opaque, cheaply-cloned node identifier. Value equality only — the spec
/// does not require a total order, so `NodeId` intentionally does not
/// implement `Ord`; deterministic ordering of nodes is the dependency
/// graph's job (registration sequence numbers), not identity's.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(Arc::from(s))
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(Arc::from(s.as_str()))
    }
}

impl From<&String> for NodeId {
    fn from(s: &String) -> Self {
        NodeId(Arc::from(s.as_str()))
    }
}

// ── ParamValue ───────────────────────────────────────────────────────

/// A parameter value inside a [`NodeSignature`].
///
/// Tagged union of the primitive types a node's inputs can take, plus an
/// opaque byte-string variant for caller-supplied blobs. `PartialEq`/`Hash`
/// are hand-written because `f64` has neither by default; floats compare
/// and hash by bit pattern so that signatures remain usable as cache keys
/// (including the edge case of two `NaN` inputs, which must compare equal
/// to each other for the cache to behave predictably).
#[derive(Debug, Clone)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Float(a), ParamValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            (ParamValue::Bool(a), ParamValue::Bool(b)) => a == b,
            (ParamValue::Text(a), ParamValue::Text(b)) => a == b,
            (ParamValue::Bytes(a), ParamValue::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ParamValue::Float(v) => v.to_bits().hash(state),
            ParamValue::Int(v) => v.hash(state),
            ParamValue::Bool(v) => v.hash(state),
            ParamValue::Text(v) => v.hash(state),
            ParamValue::Bytes(v) => v.hash(state),
        }
    }
}

// ── NodeSignature ────────────────────────────────────────────────────

/// Structural fingerprint of a node's inputs: a sorted map of named
/// parameters plus an ordered list of upstream node ids. `BTreeMap` gives
/// us a canonical iteration order "for free", which is what lets us derive
/// `Hash` here even though map-valued structs normally can't.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeSignature {
    pub params: BTreeMap<String, ParamValue>,
    pub dependencies: Vec<NodeId>,
}

impl NodeSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<NodeId>) -> Self {
        self.dependencies = deps;
        self
    }
}

// ── NodeValue ────────────────────────────────────────────────────────

/// Opaque evaluation result. The core never interprets these; only the
/// host-side `evaluate()` implementation and the host's downstream
/// consumers (audio device, renderer) give them meaning.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Scalar(f64),
    Vector(Vec<f64>),
    AudioSamples(Vec<f32>),
    FrameBytes(Vec<u8>),
}

/// A node's `evaluate()` failed. Carries a human-readable reason; the
/// evaluator wraps this into a `CoreError` with kind `NodeEvaluationFailed`
/// when it records the failure in an `EvaluationResult`.
#[derive(Debug, Clone)]
pub struct NodeEvalError(pub String);

impl fmt::Display for NodeEvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NodeEvalError {}

// ── NodeCapability ───────────────────────────────────────────────────

/// The host-supplied capability record for one node (§6 "Node capability").
///
/// The core never knows what a node computes; it only knows how to ask for
/// a signature and, on a cache miss, how to run it. Implementations must
/// not call back into any core component from within `evaluate()` —
/// re-entrancy is undefined behavior per §5.
pub trait NodeCapability: Send {
    fn id(&self) -> NodeId;

    /// Must be pure and deterministic given the node's current inputs.
    fn signature(&self) -> NodeSignature;

    /// May have side effects visible only to the host.
    fn evaluate(&mut self) -> Result<NodeValue, NodeEvalError>;
}
