//! Bounded Pool Module
//!
//! Size-accounted cache tier with LRU eviction and lazy creation on miss.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::flight::SingleFlight;
use crate::cache::{CacheKey, CacheStats, Cacheable, LruTracker};
use crate::error::Result;

/// Outcome of a lookup or creation: the shared value, or None if unavailable.
pub type Lookup<V> = Result<Option<Arc<V>>>;

// == Slot ==
/// A resident value with the cost it was admitted at.
struct Slot<V> {
    value: Arc<V>,
    cost: usize,
}

// == Pool State ==
/// Everything guarded by the pool lock.
struct PoolState<K: CacheKey> {
    entries: HashMap<K, Slot<K::Value>>,
    lru: LruTracker<K>,
    size_bytes: usize,
    stats: CacheStats,
}

impl<K: CacheKey> PoolState<K> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            size_bytes: 0,
            stats: CacheStats::new(),
        }
    }

    fn insert(&mut self, key: K, value: Arc<K::Value>) {
        let cost = value.byte_cost();
        self.lru.touch(&key);
        if let Some(previous) = self.entries.insert(key, Slot { value, cost }) {
            self.size_bytes -= previous.cost;
        }
        self.size_bytes += cost;
    }

    fn remove(&mut self, key: &K) -> Option<Arc<K::Value>> {
        let slot = self.entries.remove(key)?;
        self.lru.remove(key);
        self.size_bytes -= slot.cost;
        Some(slot.value)
    }

    /// Evicts least recently used entries until the accounted size fits.
    fn trim(&mut self, max_bytes: usize) -> usize {
        let mut evicted = 0;
        while self.size_bytes > max_bytes {
            let Some(oldest) = self.lru.evict_oldest() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&oldest) {
                self.size_bytes -= slot.cost;
                self.stats.record_eviction();
                evicted += 1;
                debug!(
                    "Evicted {} ({} bytes), pool now {} bytes",
                    oldest.describe(),
                    slot.cost,
                    self.size_bytes
                );
            }
        }
        evicted
    }
}

// == Bounded Cache Pool ==
/// Fixed-capacity pool keyed by [`CacheKey`].
///
/// The sum of the byte costs of resident entries never exceeds the capacity
/// once an operation returns. Reads and writes refresh recency; eviction
/// removes the least recently used entries first.
///
/// A miss calls the key's factory without holding the pool lock, so
/// concurrent misses on one key may each run the factory and the last store
/// wins. [`with_single_flight`](Self::with_single_flight) collapses them
/// into one call instead.
///
/// An entry costing more than the whole capacity is admitted and then
/// trimmed along with everything older, so it never stays resident. The
/// caller of `get` still receives it.
pub struct BoundedCachePool<K: CacheKey> {
    state: Mutex<PoolState<K>>,
    capacity_bytes: usize,
    flight: Option<SingleFlight<K, Option<Arc<K::Value>>>>,
}

impl<K: CacheKey> BoundedCachePool<K> {
    // == Constructor ==
    /// Creates an empty pool holding at most `capacity_bytes` of entries.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            state: Mutex::new(PoolState::new()),
            capacity_bytes,
            flight: None,
        }
    }

    /// Deduplicates concurrent misses on the same key.
    pub fn with_single_flight(mut self) -> Self {
        self.flight = Some(SingleFlight::new());
        self
    }

    // == Get ==
    /// Returns the entry for `key`, creating it on a miss.
    ///
    /// Creation failures are logged and reported as a miss. Use
    /// [`try_get`](Self::try_get) to observe the error.
    pub fn get(&self, key: &K) -> Option<Arc<K::Value>> {
        self.try_get(key).unwrap_or_else(|err| {
            warn!("Failed to create {}: {}", key.describe(), err);
            None
        })
    }

    /// Returns the entry for `key`, creating it with the key's factory on a
    /// miss and propagating factory errors.
    pub fn try_get(&self, key: &K) -> Lookup<K::Value> {
        self.get_with(key, |key| self.invoke_factory(key))
    }

    /// Like [`try_get`](Self::try_get) but a miss is resolved by `create`
    /// instead of the key's factory.
    ///
    /// A created value is stored before it is returned. An error or `None`
    /// leaves the pool untouched.
    pub fn get_with<F>(&self, key: &K, create: F) -> Lookup<K::Value>
    where
        F: FnOnce(&K) -> Lookup<K::Value>,
    {
        if let Some(value) = self.lookup(key) {
            return Ok(Some(value));
        }

        match &self.flight {
            Some(flight) => flight.run(key, || {
                // A leader that started after another flight finished
                if let Some(value) = self.peek(key) {
                    return Ok(Some(value));
                }
                self.create_and_store(key, create)
            }),
            None => self.create_and_store(key, create),
        }
    }

    fn lookup(&self, key: &K) -> Option<Arc<K::Value>> {
        let mut state = self.state.lock();
        let value = state.entries.get(key).map(|slot| Arc::clone(&slot.value));
        match value {
            Some(value) => {
                state.lru.touch(key);
                state.stats.record_hit();
                Some(value)
            }
            None => {
                state.stats.record_miss();
                None
            }
        }
    }

    fn create_and_store<F>(&self, key: &K, create: F) -> Lookup<K::Value>
    where
        F: FnOnce(&K) -> Lookup<K::Value>,
    {
        let created = create(key)?;
        if let Some(value) = &created {
            self.put(key.clone(), Arc::clone(value));
        }
        Ok(created)
    }

    /// Calls the key's factory and records the outcome.
    pub(crate) fn invoke_factory(&self, key: &K) -> Lookup<K::Value> {
        debug!("Creating {}", key.describe());
        let outcome = key.create_entry();
        let mut state = self.state.lock();
        match outcome {
            Ok(Some(value)) => {
                state.stats.record_creation();
                Ok(Some(Arc::new(value)))
            }
            Ok(None) => {
                state.stats.record_unavailable();
                debug!("{} is unavailable", key.describe());
                Ok(None)
            }
            Err(err) => {
                state.stats.record_creation_failure();
                Err(err)
            }
        }
    }

    // == Put ==
    /// Inserts or replaces the entry for `key`, marks it most recently used
    /// and evicts until the pool fits its capacity.
    pub fn put(&self, key: K, value: impl Into<Arc<K::Value>>) {
        let mut state = self.state.lock();
        state.insert(key, value.into());
        state.trim(self.capacity_bytes);
    }

    // == Remove ==
    /// Removes the entry for `key` if present.
    pub fn remove(&self, key: &K) -> Option<Arc<K::Value>> {
        self.state.lock().remove(key)
    }

    // == Clear ==
    /// Removes every entry and resets the accounted size.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.lru.clear();
        state.size_bytes = 0;
    }

    // == Trim To Size ==
    /// Evicts least recently used entries until at most `max_bytes` remain.
    ///
    /// Returns the number of evicted entries.
    pub fn trim_to_size(&self, max_bytes: usize) -> usize {
        self.state.lock().trim(max_bytes)
    }

    /// Returns the entry without creating it or refreshing recency.
    pub fn peek(&self, key: &K) -> Option<Arc<K::Value>> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|slot| Arc::clone(&slot.value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Resident keys from least to most recently used.
    pub fn keys_oldest_first(&self) -> Vec<K> {
        self.state.lock().lru.iter_oldest_first().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Sum of the byte costs of resident entries.
    pub fn size_bytes(&self) -> usize {
        self.state.lock().size_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    // == Stats ==
    /// Returns current pool statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.set_occupancy(state.entries.len(), state.size_bytes);
        stats
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut self.state.lock().stats);
    }
}

impl<K: CacheKey> fmt::Debug for BoundedCachePool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedCachePool")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("size_bytes", &state.size_bytes)
            .field("entries", &state.entries.len())
            .field("single_flight", &self.flight.is_some())
            .finish()
    }
}
