//! Audio/visual queue scheduler (C5): priority queues for audio events and
//! visual updates, adaptive per-frame batch sizing, and a synchronization
//! event stream the host can poll to observe drain accuracy.
//!
//! # Why `Arc<Mutex<..>>` instead of a component-owned `Mutex`
//!
//! Unlike C1-C3, this component's state is shared with
//! [`SyncEventStream`], which needs to keep iterating a growing history of
//! sync events after `AvQueueScheduler` itself may have been moved or
//! dropped by the caller. Each stream holds its own `Arc` clone plus a
//! private read cursor, giving "lazy, restartable" iteration: a fresh call
//! to [`AvQueueScheduler::sync_event_stream`] always starts from event 0,
//! independent of any other stream's progress.

use crate::error::{CoreError, ErrorKind};
use crate::types::{FrameStats, Priority, SchedulerConfig, SchedulerStatistics, SyncEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BATCH_MIN: u16 = 8;
const BATCH_MAX: u16 = 1024;

#[derive(Debug, Clone)]
pub struct AudioEvent {
    pub timestamp: Instant,
    pub priority: Priority,
    pub kind: String,
    pub payload: Vec<u8>,
    pub intensity: f64,
    pub frequency: f64,
}

#[derive(Debug, Clone)]
pub struct VisualUpdate {
    pub timestamp: Instant,
    pub priority: Priority,
    pub kind: String,
    pub payload: Vec<u8>,
    pub parameter: String,
    pub value: f64,
}

/// Four FIFO lanes, one per priority, drained strictly Critical → Low.
struct PriorityQueues<T> {
    critical: VecDeque<T>,
    high: VecDeque<T>,
    normal: VecDeque<T>,
    low: VecDeque<T>,
}

impl<T> PriorityQueues<T> {
    fn new() -> Self {
        Self { critical: VecDeque::new(), high: VecDeque::new(), normal: VecDeque::new(), low: VecDeque::new() }
    }

    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<T> {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    fn len(&self) -> usize {
        self.critical.len() + self.high.len() + self.normal.len() + self.low.len()
    }

    /// Evicts the oldest item from the lowest-priority non-empty lane below
    /// `Critical`. Returns whether an eviction happened.
    fn evict_lowest(&mut self) -> bool {
        for lane in [&mut self.low, &mut self.normal, &mut self.high] {
            if lane.pop_front().is_some() {
                return true;
            }
        }
        false
    }

    /// Drains up to `budget` items, strictly Critical first, then High,
    /// Normal, Low.
    fn drain_batch(&mut self, budget: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(budget.min(self.len()));
        for lane in [&mut self.critical, &mut self.high, &mut self.normal, &mut self.low] {
            while out.len() < budget {
                match lane.pop_front() {
                    Some(item) => out.push(item),
                    None => break,
                }
            }
        }
        out
    }
}

struct SchedulerState {
    audio: PriorityQueues<AudioEvent>,
    visual: PriorityQueues<VisualUpdate>,
    batch_size: u16,
    frames_processed: u64,
    dropped_events: u64,
    history: Vec<SyncEvent>,
}

impl SchedulerState {
    fn new(initial_batch_size: u16) -> Self {
        Self {
            audio: PriorityQueues::new(),
            visual: PriorityQueues::new(),
            batch_size: initial_batch_size.clamp(BATCH_MIN, BATCH_MAX),
            frames_processed: 0,
            dropped_events: 0,
            history: Vec::new(),
        }
    }
}

type AudioHandler = Box<dyn FnMut(&AudioEvent) + Send>;
type VisualHandler = Box<dyn FnMut(&VisualUpdate) + Send>;

/// The audio/visual queue scheduler component (C5).
pub struct AvQueueScheduler {
    state: Arc<Mutex<SchedulerState>>,
    config: SchedulerConfig,
    audio_handler: Mutex<Option<AudioHandler>>,
    visual_handler: Mutex<Option<VisualHandler>>,
}

impl AvQueueScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::new(config.initial_batch_size))),
            config,
            audio_handler: Mutex::new(None),
            visual_handler: Mutex::new(None),
        }
    }

    /// Registers the handler invoked once per drained audio event during
    /// `process_frame`/`process_frame_with_optimization`. Replaces any
    /// previously registered handler.
    pub fn set_audio_handler(&self, handler: impl FnMut(&AudioEvent) + Send + 'static) {
        *self.audio_handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn set_visual_handler(&self, handler: impl FnMut(&VisualUpdate) + Send + 'static) {
        *self.visual_handler.lock().unwrap() = Some(Box::new(handler));
    }

    /// Enqueues an audio event, enforcing `max_queue_depth` with
    /// priority-ordered backpressure: `Critical` is never rejected, evicting
    /// the oldest `Low` (then `Normal`, then `High`) item to make room.
    pub fn queue_audio(&self, event: AudioEvent) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        let max = self.config.max_queue_depth as usize;
        if state.audio.len() >= max {
            if event.priority == Priority::Critical {
                if !state.audio.evict_lowest() {
                    log::warn!("audio queue full and no evictable item for critical event");
                }
            } else {
                state.dropped_events += 1;
                log::warn!("audio queue full, rejecting {:?} priority event", event.priority);
                return Err(CoreError::new(ErrorKind::QueueFull, "audio queue is at capacity"));
            }
        }
        let priority = event.priority;
        state.audio.lane_mut(priority).push_back(event);
        Ok(())
    }

    pub fn queue_visual(&self, update: VisualUpdate) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        let max = self.config.max_queue_depth as usize;
        if state.visual.len() >= max {
            if update.priority == Priority::Critical {
                if !state.visual.evict_lowest() {
                    log::warn!("visual queue full and no evictable item for critical update");
                }
            } else {
                state.dropped_events += 1;
                log::warn!("visual queue full, rejecting {:?} priority update", update.priority);
                return Err(CoreError::new(ErrorKind::QueueFull, "visual queue is at capacity"));
            }
        }
        let priority = update.priority;
        state.visual.lane_mut(priority).push_back(update);
        Ok(())
    }

    /// Drains up to the current batch size from both queues, strictly by
    /// priority, then adapts the batch size toward the target frame budget.
    pub fn process_frame(&self) -> FrameStats {
        self.process_frame_inner(false)
    }

    /// Same as [`Self::process_frame`], but coalesces same-`parameter`
    /// visual updates within the drained batch down to the latest value.
    pub fn process_frame_with_optimization(&self) -> FrameStats {
        self.process_frame_inner(true)
    }

    fn process_frame_inner(&self, coalesce: bool) -> FrameStats {
        let frame_start = Instant::now();
        let mut state = self.state.lock().unwrap();
        let budget = state.batch_size as usize;

        let audio_batch = state.audio.drain_batch(budget);
        let mut visual_batch = state.visual.drain_batch(budget);

        let latency_count = audio_batch.len() + visual_batch.len();
        let latency_total: Duration = audio_batch
            .iter()
            .map(|e| frame_start.saturating_duration_since(e.timestamp))
            .chain(visual_batch.iter().map(|u| frame_start.saturating_duration_since(u.timestamp)))
            .sum();
        let avg_latency = if latency_count > 0 { latency_total / latency_count as u32 } else { Duration::ZERO };

        let mut coalesced = 0;
        if coalesce {
            let before = visual_batch.len();
            visual_batch = coalesce_by_parameter(visual_batch);
            coalesced = before - visual_batch.len();
        }

        {
            let mut audio_handler = self.audio_handler.lock().unwrap();
            if let Some(handler) = audio_handler.as_mut() {
                for event in &audio_batch {
                    handler(event);
                }
            }
            let mut visual_handler = self.visual_handler.lock().unwrap();
            if let Some(handler) = visual_handler.as_mut() {
                for update in &visual_batch {
                    handler(update);
                }
            }
        }

        let processing = frame_start.elapsed();
        let pending_after = state.audio.len() + state.visual.len();

        let target = Duration::from_secs_f64(1.0 / self.config.target_frame_rate as f64);
        let hot = Duration::from_secs_f64(target.as_secs_f64() * 0.8);
        let cool = Duration::from_secs_f64(target.as_secs_f64() * 0.4);
        let over_budget = pending_after > state.batch_size as usize;

        let new_batch_size = if processing > hot && over_budget {
            ((state.batch_size as f64 * 0.75) as u16).max(BATCH_MIN)
        } else if processing < cool && over_budget {
            ((state.batch_size as f64 * 1.25) as u16).min(BATCH_MAX)
        } else {
            state.batch_size
        };
        state.batch_size = new_batch_size;
        state.frames_processed += 1;

        let denom = audio_batch.len().max(visual_batch.len()).max(1) as f64;
        let balance = (audio_batch.len() as f64 - visual_batch.len() as f64).abs();
        let sync_accuracy = 1.0 - (balance / denom);

        state.history.push(SyncEvent {
            frame_number: state.frames_processed,
            audio_drained: audio_batch.len(),
            visual_drained: visual_batch.len(),
            sync_accuracy,
        });

        log::trace!(
            "frame {}: drained {} audio / {} visual, batch_size now {}",
            state.frames_processed,
            audio_batch.len(),
            visual_batch.len(),
            state.batch_size
        );

        FrameStats {
            audio_drained: audio_batch.len(),
            visual_drained: visual_batch.len(),
            pending_after,
            avg_latency,
            processing_ms: processing.as_secs_f64() * 1000.0,
            coalesced,
        }
    }

    /// A lazy, restartable iterator over sync events recorded so far. Each
    /// call returns a fresh stream starting at event 0; multiple live
    /// streams progress independently.
    pub fn sync_event_stream(&self) -> SyncEventStream {
        SyncEventStream { state: Arc::clone(&self.state), cursor: 0 }
    }

    pub fn statistics(&self) -> SchedulerStatistics {
        let state = self.state.lock().unwrap();
        SchedulerStatistics {
            pending_audio: state.audio.len(),
            pending_visual: state.visual.len(),
            current_batch_size: state.batch_size,
            frames_processed: state.frames_processed,
            dropped_events: state.dropped_events,
        }
    }
}

/// Coalesces visual updates that share a `parameter` name, keeping only the
/// latest-by-timestamp update for each and preserving the first-seen
/// relative order of distinct parameters.
fn coalesce_by_parameter(batch: Vec<VisualUpdate>) -> Vec<VisualUpdate> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: std::collections::HashMap<String, VisualUpdate> = std::collections::HashMap::new();
    for update in batch {
        let key = update.parameter.clone();
        if !latest.contains_key(&key) {
            order.push(key.clone());
        }
        latest
            .entry(key)
            .and_modify(|existing| {
                if update.timestamp >= existing.timestamp {
                    *existing = update.clone();
                }
            })
            .or_insert(update);
    }
    order.into_iter().filter_map(|key| latest.remove(&key)).collect()
}

/// A restartable, lazy iterator over a scheduler's accumulated sync event
/// history. Holds its own cursor and `Arc` clone of the scheduler's state.
pub struct SyncEventStream {
    state: Arc<Mutex<SchedulerState>>,
    cursor: usize,
}

impl Iterator for SyncEventStream {
    type Item = SyncEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.lock().unwrap();
        let event = state.history.get(self.cursor).copied();
        if event.is_some() {
            self.cursor += 1;
        }
        event
    }
}
