//! Shared data types: priorities, regions, and the observable result/statistics
//! records produced by the five components.
//!
//! These records derive `serde::Serialize`/`Deserialize` so a host that wants
//! to ship them to a debug overlay or a log sink can do so without writing an
//! adapter layer, even though the core itself has no wire protocol (§6).

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// ── Priority ─────────────────────────────────────────────────────────

/// Shared priority scale used by dirty levels, regions, and scheduler events.
/// Ordered `Low < Normal < High < Critical` so `max()`/`Ord` comparisons read
/// naturally wherever the spec calls for "the higher of two levels".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

// ── Rect (UI-invalidation regions) ──────────────────────────────────

/// Axis-aligned rectangle used for region-based UI invalidation queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle containing both `self` and `other`. Not a set
    /// union for overlapping, non-containing rects — callers needing exact
    /// union area want [`Rect::union_area`] instead.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Exact area of the set union of `rects`, correct for overlapping
    /// rectangles (unlike summing `area()` or taking a bounding-box
    /// `union()`). Coordinate-compresses the x/y edges into a grid and sums
    /// the cells covered by at least one rect.
    pub fn union_area(rects: &[Rect]) -> f64 {
        if rects.is_empty() {
            return 0.0;
        }
        let mut xs: Vec<f64> = rects.iter().flat_map(|r| [r.x, r.right()]).collect();
        let mut ys: Vec<f64> = rects.iter().flat_map(|r| [r.y, r.bottom()]).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        xs.dedup();
        ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
        ys.dedup();

        let mut area = 0.0;
        for wx in xs.windows(2) {
            let (x0, x1) = (wx[0], wx[1]);
            let cx = (x0 + x1) / 2.0;
            for wy in ys.windows(2) {
                let (y0, y1) = (wy[0], wy[1]);
                let cy = (y0 + y1) / 2.0;
                if rects.iter().any(|r| r.x <= cx && cx <= r.right() && r.y <= cy && cy <= r.bottom()) {
                    area += (x1 - x0) * (y1 - y0);
                }
            }
        }
        area
    }
}

/// A node's UI-invalidation region: a rectangle plus an invalidation priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub rect: Rect,
    pub priority: Priority,
}

/// A cluster of overlapping [`Region`]s produced by
/// [`crate::dirty::DirtyTracker::merged_dirty_regions_in_viewport`]. Keeps
/// every original rectangle in the cluster rather than collapsing them into
/// a bounding box, so the union of `rects` is always exactly the union of
/// the regions that were merged — use [`Self::area`] to get that area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRegion {
    pub rects: Vec<Rect>,
    pub priority: Priority,
}

impl MergedRegion {
    pub fn area(&self) -> f64 {
        Rect::union_area(&self.rects)
    }
}

// ── Evaluator observables (C4) ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalKind {
    Full,
    Incremental,
    Single,
}

/// Result of one evaluation pass (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub kind: EvalKind,
    #[serde(skip, default = "Instant::now")]
    pub started_at: Instant,
    #[serde(skip, default = "Instant::now")]
    pub ended_at: Instant,
    pub total_duration: Duration,
    pub evaluated_count: usize,
    pub failed_count: usize,
    pub cached_count: usize,
    /// Per-node wall time, in call order.
    #[serde(skip)]
    pub per_node_durations: Vec<(NodeId, Duration)>,
    pub all_succeeded: bool,
    /// True only when the pass was stopped early by `halt_on_first_failure`.
    pub halted_early: bool,
}

impl EvaluationResult {
    pub(crate) fn empty(kind: EvalKind) -> Self {
        let now = Instant::now();
        Self {
            kind,
            started_at: now,
            ended_at: now,
            total_duration: Duration::ZERO,
            evaluated_count: 0,
            failed_count: 0,
            cached_count: 0,
            per_node_durations: Vec::new(),
            all_succeeded: true,
            halted_early: false,
        }
    }
}

/// Cumulative, pull-based evaluator observability (§10.5 — supplements the
/// distilled spec's "per-node durations (optional)" note with a concrete
/// lifetime counter, mirroring the progress-reporting pattern this codebase
/// already uses one layer up in its incremental evaluation path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorMetrics {
    pub total_passes: u64,
    pub total_evaluated: u64,
    pub total_cached: u64,
    pub total_failed: u64,
    pub last_result: Option<EvaluationResult>,
}

impl Default for EvaluatorMetrics {
    fn default() -> Self {
        Self {
            total_passes: 0,
            total_evaluated: 0,
            total_cached: 0,
            total_failed: 0,
            last_result: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub halt_on_first_failure: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { halt_on_first_failure: false }
    }
}

// ── Cache observables (C3) ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u32,
    /// Zero means "no expiry".
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 4096, ttl: Duration::ZERO }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub evictions: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ── Dirty tracker observables (C2) ───────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrackerStatistics {
    pub registered_count: usize,
    pub dirty_count: usize,
}

// ── Scheduler observables (C5) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub target_frame_rate: u16,
    pub max_queue_depth: u32,
    pub initial_batch_size: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { target_frame_rate: 60, max_queue_depth: 1024, initial_batch_size: 32 }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FrameStats {
    pub audio_drained: usize,
    pub visual_drained: usize,
    pub pending_after: usize,
    #[serde(skip)]
    pub avg_latency: Duration,
    pub processing_ms: f64,
    pub coalesced: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncEvent {
    pub frame_number: u64,
    pub audio_drained: usize,
    pub visual_drained: usize,
    pub sync_accuracy: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SchedulerStatistics {
    pub pending_audio: usize,
    pub pending_visual: usize,
    pub current_batch_size: u16,
    pub frames_processed: u64,
    pub dropped_events: u64,
}
