//! Memoization cache (C3): `(NodeId, NodeSignature) → result`, with TTL
//! (since insertion, per the distilled spec's resolved open question) and
//! LRU-by-last-access eviction under a fixed capacity.
//!
//! # Why a plain `HashMap` key works here
//!
//! `NodeSignature` derives `Hash` (via `BTreeMap`'s blanket impl plus our
//! hand-written `Hash` for `ParamValue`), so the natural `HashMap<(NodeId,
//! NodeSignature), CacheEntry>` representation is directly usable — no
//! linear scan per node is needed to find a matching signature.

use crate::node::{NodeId, NodeSignature, NodeValue};
use crate::types::{CacheConfig, CacheStatistics};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Result of a [`MemoizationCache::lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(NodeValue),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

#[derive(Clone)]
struct CacheEntry {
    value: NodeValue,
    inserted_at: Instant,
    last_access: Instant,
}

struct CacheState {
    entries: HashMap<(NodeId, NodeSignature), CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn new() -> Self {
        Self { entries: HashMap::new(), hits: 0, misses: 0, evictions: 0 }
    }

    fn is_expired(&self, entry: &CacheEntry, ttl: std::time::Duration, now: Instant) -> bool {
        !ttl.is_zero() && now.duration_since(entry.inserted_at) >= ttl
    }

    /// Evicts the least-recently-accessed entry. No-op if empty.
    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions += 1;
        }
    }
}

/// The memoization cache component (C3). Fixed configuration set at
/// construction; every method acquires and releases the single component
/// lock within its own body.
pub struct MemoizationCache {
    inner: Mutex<CacheState>,
    config: CacheConfig,
}

impl MemoizationCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { inner: Mutex::new(CacheState::new()), config }
    }

    /// Returns the stored result iff an entry for `id` exists with an
    /// equal signature and it is not expired. A hit updates the entry's
    /// last-access time for LRU purposes.
    pub fn lookup(&self, id: &NodeId, signature: &NodeSignature) -> Lookup {
        let mut state = self.inner.lock().unwrap();
        let now = Instant::now();
        let key = (id.clone(), signature.clone());
        let ttl = self.config.ttl;

        let expired = match state.entries.get(&key) {
            Some(entry) => state.is_expired(entry, ttl, now),
            None => {
                state.misses += 1;
                return Lookup::Miss;
            }
        };

        if expired {
            state.entries.remove(&key);
            state.misses += 1;
            return Lookup::Miss;
        }

        let entry = state.entries.get_mut(&key).unwrap();
        entry.last_access = now;
        state.hits += 1;
        Lookup::Hit(entry.value.clone())
    }

    /// Inserts or replaces the entry for `(id, signature)`. If inserting a
    /// new key would exceed `max_entries`, evicts the least-recently-used
    /// entry first.
    pub fn store(&self, id: NodeId, signature: NodeSignature, result: NodeValue) {
        let mut state = self.inner.lock().unwrap();
        let now = Instant::now();
        let key = (id, signature);

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_entries as usize {
            state.evict_lru();
        }

        state.entries.insert(key, CacheEntry { value: result, inserted_at: now, last_access: now });
    }

    /// Removes every entry for `id`. Idempotent.
    pub fn invalidate(&self, id: &NodeId) {
        let mut state = self.inner.lock().unwrap();
        state.entries.retain(|(entry_id, _), _| entry_id != id);
    }

    /// Removes entries for `id` and every id in `dependents` (a
    /// borrowed-view transitive-successor set provided by the caller —
    /// the cache does not own graph topology).
    pub fn invalidate_with_dependents(&self, id: &NodeId, dependents: &std::collections::HashSet<NodeId>) {
        let mut state = self.inner.lock().unwrap();
        state.entries.retain(|(entry_id, _), _| entry_id != id && !dependents.contains(entry_id));
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }

    pub fn statistics(&self) -> CacheStatistics {
        let state = self.inner.lock().unwrap();
        CacheStatistics {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            evictions: state.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ParamValue;
    use std::time::Duration;

    fn sig(v: f64) -> NodeSignature {
        NodeSignature::new().with_param("x", ParamValue::Float(v))
    }

    #[test]
    fn round_trip_hit() {
        let cache = MemoizationCache::new(CacheConfig::default());
        let id = NodeId::from("n");
        cache.store(id.clone(), sig(1.0), NodeValue::Scalar(42.0));
        match cache.lookup(&id, &sig(1.0)) {
            Lookup::Hit(NodeValue::Scalar(v)) => assert_eq!(v, 42.0),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_signature_misses() {
        let cache = MemoizationCache::new(CacheConfig::default());
        let id = NodeId::from("n");
        cache.store(id.clone(), sig(1.0), NodeValue::Scalar(42.0));
        assert!(!cache.lookup(&id, &sig(2.0)).is_hit());
    }

    #[test]
    fn invalidate_clears_entries_for_node() {
        let cache = MemoizationCache::new(CacheConfig::default());
        let id = NodeId::from("n");
        cache.store(id.clone(), sig(1.0), NodeValue::Scalar(1.0));
        cache.invalidate(&id);
        assert!(!cache.lookup(&id, &sig(1.0)).is_hit());
    }

    #[test]
    fn capacity_evicts_exactly_one_lru_victim() {
        let cache = MemoizationCache::new(CacheConfig { max_entries: 2, ttl: Duration::ZERO });
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        let c = NodeId::from("c");
        cache.store(a.clone(), sig(1.0), NodeValue::Scalar(1.0));
        cache.store(b.clone(), sig(1.0), NodeValue::Scalar(2.0));
        // touch a so b is the LRU victim
        cache.lookup(&a, &sig(1.0));
        cache.store(c.clone(), sig(1.0), NodeValue::Scalar(3.0));

        assert!(cache.lookup(&a, &sig(1.0)).is_hit());
        assert!(!cache.lookup(&b, &sig(1.0)).is_hit());
        assert!(cache.lookup(&c, &sig(1.0)).is_hit());
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[test]
    fn ttl_expiry() {
        let cache = MemoizationCache::new(CacheConfig { max_entries: 10, ttl: Duration::from_millis(1) });
        let id = NodeId::from("n");
        cache.store(id.clone(), sig(1.0), NodeValue::Scalar(1.0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.lookup(&id, &sig(1.0)).is_hit());
    }

    #[test]
    fn invalidate_with_dependents() {
        let cache = MemoizationCache::new(CacheConfig::default());
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        cache.store(a.clone(), sig(1.0), NodeValue::Scalar(1.0));
        cache.store(b.clone(), sig(1.0), NodeValue::Scalar(2.0));
        let mut deps = std::collections::HashSet::new();
        deps.insert(b.clone());
        cache.invalidate_with_dependents(&a, &deps);
        assert!(!cache.lookup(&a, &sig(1.0)).is_hit());
        assert!(!cache.lookup(&b, &sig(1.0)).is_hit());
    }
}
