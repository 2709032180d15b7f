//! Expiring Pool Module
//!
//! Bounded tier composed with a reclaimable secondary tier and staleness
//! checks on read.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::bounded::Lookup;
use crate::cache::soft::{SoftLookup, SoftStore, SweepReport};
use crate::cache::{BoundedCachePool, CacheKey, CacheStats, Expirable};

/// Default ratio between the secondary strong budget and the bounded capacity.
pub const SECONDARY_BUDGET_FACTOR: usize = 4;

// == Expiring Cache Pool ==
/// Two-tier pool whose values can go stale.
///
/// On a bounded-tier miss the secondary tier is consulted before the key's
/// factory: a live reference there is returned as is, stale or not. A stale
/// value found on read is removed from both tiers and loaded again exactly
/// once; if the reload is stale too it is returned anyway.
///
/// The two tiers are locked independently, so for a short window one may
/// hold a value the other has already dropped. [`clear`](Self::clear) is the
/// exception and excludes every other operation while it runs.
pub struct ExpiringCachePool<K: CacheKey>
where
    K::Value: Expirable,
{
    bounded: BoundedCachePool<K>,
    secondary: SoftStore<K, K::Value>,
    /// Shared by every operation, exclusive for clear
    gate: RwLock<()>,
}

impl<K: CacheKey> ExpiringCachePool<K>
where
    K::Value: Expirable,
{
    // == Constructor ==
    /// Creates a pool with `capacity_bytes` in the bounded tier and a
    /// secondary tier keeping up to four times that strongly reachable.
    pub fn new(capacity_bytes: usize) -> Self {
        let secondary = SoftStore::new(capacity_bytes.saturating_mul(SECONDARY_BUDGET_FACTOR));
        Self::with_tiers(BoundedCachePool::new(capacity_bytes), secondary)
    }

    /// Builds a pool from explicitly configured tiers.
    pub fn with_tiers(bounded: BoundedCachePool<K>, secondary: SoftStore<K, K::Value>) -> Self {
        Self {
            bounded,
            secondary,
            gate: RwLock::new(()),
        }
    }

    // == Get ==
    /// Returns a fresh entry for `key` if one can be had, logging creation
    /// failures and reporting them as a miss.
    pub fn get(&self, key: &K) -> Option<Arc<K::Value>> {
        self.try_get(key).unwrap_or_else(|err| {
            warn!("Failed to create {}: {}", key.describe(), err);
            None
        })
    }

    /// Returns the entry for `key`, propagating factory errors.
    pub fn try_get(&self, key: &K) -> Lookup<K::Value> {
        let _gate = self.gate.read_recursive();

        let Some(value) = self.load(key)? else {
            return Ok(None);
        };
        if !value.is_stale() {
            return Ok(Some(value));
        }

        debug!("{} is stale, reloading", key.describe());
        self.bounded.record(CacheStats::record_stale_reload);
        self.remove_tiers(key);

        let reloaded = self.load(key)?;
        if reloaded.as_ref().is_some_and(|value| value.is_stale()) {
            debug!("Reloaded {} is already stale", key.describe());
        }
        Ok(reloaded)
    }

    fn load(&self, key: &K) -> Lookup<K::Value> {
        self.bounded.get_with(key, |key| self.create_entry_for(key))
    }

    // == Create Entry For ==
    /// Resolves a bounded-tier miss: the secondary reference if it is still
    /// live, otherwise the key's factory.
    fn create_entry_for(&self, key: &K) -> Lookup<K::Value> {
        match self.secondary.lookup(key) {
            SoftLookup::Live(value) => {
                debug!("Restored {} from the secondary tier", key.describe());
                self.bounded.record(CacheStats::record_secondary_hit);
                return Ok(Some(value));
            }
            SoftLookup::Reclaimed => {
                debug!("Secondary reference for {} was reclaimed", key.describe());
            }
            SoftLookup::Absent => {}
        }

        let created = self.bounded.invoke_factory(key)?;
        if let Some(value) = &created {
            self.secondary.refresh(key.clone(), Arc::clone(value));
        }
        Ok(created)
    }

    // == Put ==
    /// Stores `value` in both tiers, overwriting any secondary reference.
    pub fn put(&self, key: K, value: impl Into<Arc<K::Value>>) {
        let _gate = self.gate.read_recursive();
        let value = value.into();
        self.secondary.refresh(key.clone(), Arc::clone(&value));
        self.bounded.put(key, value);
    }

    // == Remove ==
    /// Removes `key` from both tiers.
    pub fn remove(&self, key: &K) {
        let _gate = self.gate.read_recursive();
        self.remove_tiers(key);
    }

    fn remove_tiers(&self, key: &K) {
        self.secondary.remove(key);
        self.bounded.remove(key);
    }

    // == Clear ==
    /// Empties both tiers while no other operation is running.
    pub fn clear(&self) {
        let _gate = self.gate.write();
        self.secondary.clear();
        self.bounded.clear();
    }

    // == Maintenance ==
    /// Applies idle decay to the secondary tier and drops dead references.
    pub fn sweep(&self) -> SweepReport {
        let _gate = self.gate.read_recursive();
        self.secondary.sweep()
    }

    /// Releases memory: demotes every secondary reference and trims the
    /// bounded tier to half its capacity.
    ///
    /// Returns the number of entries evicted from the bounded tier.
    pub fn on_memory_pressure(&self) -> usize {
        let _gate = self.gate.read_recursive();
        let demoted = self.secondary.reclaim_all();
        let evicted = self
            .bounded
            .trim_to_size(self.bounded.capacity_bytes() / 2);
        info!(
            "Memory pressure: demoted {} secondary references, evicted {} entries",
            demoted, evicted
        );
        evicted
    }

    // == Introspection ==
    pub fn contains(&self, key: &K) -> bool {
        self.bounded.contains(key)
    }

    pub fn peek(&self, key: &K) -> Option<Arc<K::Value>> {
        self.bounded.peek(key)
    }

    pub fn len(&self) -> usize {
        self.bounded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounded.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.bounded.size_bytes()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bounded.capacity_bytes()
    }

    /// Secondary tier, advisory only.
    pub fn secondary(&self) -> &SoftStore<K, K::Value> {
        &self.secondary
    }

    pub fn stats(&self) -> CacheStats {
        self.bounded.stats()
    }
}

impl<K: CacheKey> fmt::Debug for ExpiringCachePool<K>
where
    K::Value: Expirable,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCachePool")
            .field("bounded", &self.bounded)
            .field("secondary_refs", &self.secondary.len())
            .field("secondary_strong_bytes", &self.secondary.strong_bytes())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{Clock, Expiry, ManualClock};
    use crate::cache::Cacheable;
    use crate::error::{CacheError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Doc {
        cost: usize,
        serial: usize,
        expiry: Expiry,
    }

    impl Cacheable for Doc {
        fn byte_cost(&self) -> usize {
            self.cost
        }
    }

    impl Expirable for Doc {
        fn is_stale(&self) -> bool {
            self.expiry.is_stale()
        }
    }

    #[derive(Debug, Clone)]
    struct DocKey {
        name: &'static str,
        cost: usize,
        ttl: Duration,
        clock: ManualClock,
        calls: Arc<AtomicUsize>,
        fail: bool,
        /// Time that passes while the factory runs
        creation_time: Duration,
    }

    impl PartialEq for DocKey {
        fn eq(&self, other: &Self) -> bool {
            self.name == other.name
        }
    }

    impl Eq for DocKey {}

    impl std::hash::Hash for DocKey {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.name.hash(state);
        }
    }

    impl CacheKey for DocKey {
        type Value = Doc;

        fn create_entry(&self) -> Result<Option<Doc>> {
            let serial = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(CacheError::Creation("offline".to_string()));
            }
            let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
            let doc = Doc {
                cost: self.cost,
                serial,
                expiry: Expiry::with_clock(self.ttl, clock),
            };
            self.clock.advance(self.creation_time);
            Ok(Some(doc))
        }
    }

    fn doc_key(name: &'static str, cost: usize, clock: &ManualClock) -> DocKey {
        DocKey {
            name,
            cost,
            ttl: Duration::from_secs(300),
            clock: clock.clone(),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
            creation_time: Duration::ZERO,
        }
    }

    fn calls(key: &DocKey) -> usize {
        key.calls.load(Ordering::SeqCst)
    }

    #[test]
    fn test_fresh_entry_is_served_without_recreation() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(100);
        let a = doc_key("a", 10, &clock);

        let first = pool.get(&a).unwrap();
        clock.advance(Duration::from_secs(60));
        let second = pool.get(&a).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls(&a), 1);
    }

    #[test]
    fn test_stale_entry_is_recreated_once() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(100);
        let a = doc_key("a", 10, &clock);

        assert_eq!(pool.get(&a).unwrap().serial, 1);
        clock.advance(Duration::from_secs(360));
        let reloaded = pool.get(&a).unwrap();

        assert_eq!(reloaded.serial, 2);
        assert!(!reloaded.is_stale());
        assert_eq!(calls(&a), 2);
        assert_eq!(pool.stats().stale_reloads, 1);
    }

    #[test]
    fn test_stale_reload_is_returned_without_looping() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(100);
        let mut a = doc_key("a", 10, &clock);
        // Every entry is already stale by the time the factory returns
        a.ttl = Duration::ZERO;
        a.creation_time = Duration::from_secs(1);

        let value = pool.get(&a).unwrap();

        assert_eq!(value.serial, 2);
        assert!(value.is_stale());
        assert_eq!(calls(&a), 2);
        assert_eq!(pool.stats().stale_reloads, 1);
    }

    #[test]
    fn test_secondary_tier_restores_evicted_entry() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(10);
        let a = doc_key("a", 6, &clock);
        let b = doc_key("b", 6, &clock);

        let first = pool.get(&a).unwrap();
        pool.get(&b);
        assert!(!pool.contains(&a));
        assert_eq!(pool.size_bytes(), 6);

        let restored = pool.get(&a).unwrap();
        assert!(Arc::ptr_eq(&first, &restored));
        assert_eq!(calls(&a), 1);
        assert!(!pool.contains(&b));
        assert_eq!(pool.stats().secondary_hits, 1);
    }

    #[test]
    fn test_reclaimed_secondary_reference_falls_through_to_factory() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(10);
        let a = doc_key("a", 6, &clock);
        let b = doc_key("b", 6, &clock);

        drop(pool.get(&a));
        pool.get(&b);
        pool.secondary().reclaim_all();

        let recreated = pool.get(&a).unwrap();
        assert_eq!(recreated.serial, 2);
        assert_eq!(calls(&a), 2);
        assert!(pool.contains(&a));
        assert!(!pool.contains(&b));
    }

    #[test]
    fn test_secondary_hit_ignores_staleness_until_read() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(10);
        let a = doc_key("a", 6, &clock);
        let b = doc_key("b", 6, &clock);

        pool.get(&a);
        pool.get(&b);
        clock.advance(Duration::from_secs(600));

        // Secondary returns the stale value, the read notices and reloads
        let value = pool.get(&a).unwrap();
        assert_eq!(value.serial, 2);
        assert_eq!(pool.stats().secondary_hits, 1);
        assert_eq!(pool.stats().stale_reloads, 1);
    }

    #[test]
    fn test_put_overwrites_secondary_reference() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(10);
        let a = doc_key("a", 6, &clock);
        let b = doc_key("b", 6, &clock);

        pool.get(&a);
        pool.put(
            a.clone(),
            Doc {
                cost: 6,
                serial: 99,
                expiry: Expiry::never(),
            },
        );
        pool.get(&b);

        assert_eq!(pool.get(&a).unwrap().serial, 99);
        assert_eq!(calls(&a), 1);
    }

    #[test]
    fn test_remove_clears_both_tiers() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(100);
        let a = doc_key("a", 10, &clock);

        let held = pool.get(&a).unwrap();
        pool.remove(&a);

        assert!(!pool.contains(&a));
        assert!(matches!(pool.secondary().lookup(&a), SoftLookup::Absent));
        assert_eq!(pool.get(&a).unwrap().serial, 2);
        drop(held);
    }

    #[test]
    fn test_clear_empties_both_tiers() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(100);
        let a = doc_key("a", 10, &clock);
        let b = doc_key("b", 10, &clock);
        pool.get(&a);
        pool.get(&b);

        pool.clear();

        assert!(pool.is_empty());
        assert!(pool.secondary().is_empty());
        assert_eq!(pool.size_bytes(), 0);
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(100);
        let mut a = doc_key("a", 10, &clock);
        a.fail = true;

        assert!(matches!(pool.try_get(&a), Err(CacheError::Creation(_))));
        assert!(pool.get(&a).is_none());
        assert!(pool.is_empty());
        assert!(pool.secondary().is_empty());
        assert_eq!(calls(&a), 2);
    }

    #[test]
    fn test_memory_pressure_demotes_and_trims() {
        let clock = ManualClock::default();
        let pool = ExpiringCachePool::new(40);
        for name in ["a", "b", "c", "d"] {
            pool.get(&doc_key(name, 10, &clock));
        }

        let evicted = pool.on_memory_pressure();

        assert_eq!(evicted, 2);
        assert_eq!(pool.size_bytes(), 20);
        assert_eq!(pool.secondary().strong_bytes(), 0);
        // Evicted entries had no other holder, so their references are dead
        assert_eq!(pool.sweep().purged, 2);
    }
}
