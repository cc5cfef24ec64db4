//! `graph-core` — incremental evaluation core for a real-time audio-visual
//! node-graph runtime.
//!
//! No I/O, no audio/video device access, no rendering: the host owns all of
//! that. This crate owns dependency tracking, dirty propagation, result
//! memoization, topological evaluation, and audio/visual event scheduling —
//! the pieces a host needs to avoid re-running the whole graph on every
//! frame.
//!
//! # Modules
//!
//! - [`node`]      — `NodeId`, `NodeSignature`, `NodeValue`, the host-supplied `NodeCapability` trait
//! - [`graph`]      — `DependencyGraph` (C1): edges, cycle detection, deterministic topological order
//! - [`dirty`]      — `DirtyTracker` (C2): per-node dirty flag, priority levels, UI regions
//! - [`cache`]      — `MemoizationCache` (C3): signature-keyed memoization with TTL and LRU eviction
//! - [`evaluator`]  — `Evaluator` (C4): drives full/incremental/single-node passes
//! - [`scheduler`]  — `AvQueueScheduler` (C5): priority queues and adaptive batch draining
//! - [`types`]      — shared result/statistics/config records
//! - [`error`]      — `CoreError`, `ErrorKind`
//!
//! # Composing the five components
//!
//! A host typically owns one [`graph::DependencyGraph`], one
//! [`dirty::DirtyTracker`], and one [`cache::MemoizationCache`], each
//! wrapped in an `Arc` and handed to an [`evaluator::Evaluator`], plus an
//! independent [`scheduler::AvQueueScheduler`] for output draining:
//!
//! ```
//! use graph_core::{
//!     cache::MemoizationCache, dirty::DirtyTracker, evaluator::Evaluator, graph::DependencyGraph,
//!     types::{CacheConfig, EvaluatorConfig},
//! };
//! use std::sync::Arc;
//!
//! let graph = Arc::new(DependencyGraph::new());
//! let tracker = Arc::new(DirtyTracker::new());
//! let cache = Arc::new(MemoizationCache::new(CacheConfig::default()));
//! let evaluator = Evaluator::new(graph, tracker, cache, EvaluatorConfig::default());
//! let _ = evaluator.evaluate_all();
//! ```

pub mod cache;
pub mod dirty;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod node;
pub mod scheduler;
pub mod types;

pub use cache::MemoizationCache;
pub use dirty::{DirtyLevel, DirtyTracker};
pub use error::{CoreError, ErrorKind};
pub use evaluator::Evaluator;
pub use graph::DependencyGraph;
pub use node::{NodeCapability, NodeId, NodeSignature, NodeValue};
pub use scheduler::{AudioEvent, AvQueueScheduler, VisualUpdate};
