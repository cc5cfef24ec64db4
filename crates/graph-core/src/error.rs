//! Crate-wide error type.
//!
//! Following this codebase's convention, errors are a plain enum of
//! machine-readable kinds plus a human-readable message, with a hand-written
//! `Display`/`Error` impl rather than a derive-macro crate.

use std::fmt;

/// Machine-readable error kinds raised by the core components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `add_edge`/`mark` referenced a node id that is not registered.
    UnknownNode,
    /// `add_node` was called with an id that is already registered.
    AlreadyExists,
    /// `add_edge` would have introduced a cycle; the graph is unchanged.
    CycleDetected,
    /// A scheduler queue is at capacity and the event could not be admitted.
    QueueFull,
    /// A single node's `evaluate()` failed. Recovered locally by the evaluator.
    NodeEvaluationFailed,
    /// Invariant E1 violated: a predecessor was not evaluated before its dependent.
    DependencyNotEvaluated,
    /// An edge referenced a node absent from the graph mid-pass.
    CorruptGraph,
    /// The dependency graph changed structurally while a pass was in flight.
    GraphMutatedDuringEvaluation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownNode => "UNKNOWN_NODE",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::CycleDetected => "CYCLE_DETECTED",
            ErrorKind::QueueFull => "QUEUE_FULL",
            ErrorKind::NodeEvaluationFailed => "NODE_EVALUATION_FAILED",
            ErrorKind::DependencyNotEvaluated => "DEPENDENCY_NOT_EVALUATED",
            ErrorKind::CorruptGraph => "CORRUPT_GRAPH",
            ErrorKind::GraphMutatedDuringEvaluation => "GRAPH_MUTATED_DURING_EVALUATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error returned by core operations.
#[derive(Debug, Clone)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {}
