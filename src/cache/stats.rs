//! Cache Statistics Module
//!
//! Tracks pool performance metrics including hits, misses, creations and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks pool performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered by the bounded tier
    pub hits: u64,
    /// Lookups that missed the bounded tier
    pub misses: u64,
    /// Entries evicted to restore the capacity invariant
    pub evictions: u64,
    /// Factory invocations that produced an entry
    pub creations: u64,
    /// Factory invocations that returned an error
    pub creation_failures: u64,
    /// Factory invocations that reported the artifact unavailable
    pub unavailable: u64,
    /// Misses answered by the secondary tier without calling the factory
    pub secondary_hits: u64,
    /// Stale entries dropped and reloaded on read
    pub stale_reloads: u64,
    /// Current number of resident entries
    pub total_entries: usize,
    /// Current accounted size in bytes
    pub size_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the bounded-tier hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_creation(&mut self) {
        self.creations += 1;
    }

    pub fn record_creation_failure(&mut self) {
        self.creation_failures += 1;
    }

    pub fn record_unavailable(&mut self) {
        self.unavailable += 1;
    }

    pub fn record_secondary_hit(&mut self) {
        self.secondary_hits += 1;
    }

    pub fn record_stale_reload(&mut self) {
        self.stale_reloads += 1;
    }

    // == Update Occupancy ==
    /// Updates the resident entry count and accounted size.
    pub fn set_occupancy(&mut self, entries: usize, size_bytes: usize) {
        self.total_entries = entries;
        self.size_bytes = size_bytes;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.total_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_record_counters() {
        let mut stats = CacheStats::new();
        stats.record_eviction();
        stats.record_eviction();
        stats.record_creation();
        stats.record_creation_failure();
        stats.record_unavailable();
        stats.record_secondary_hit();
        stats.record_stale_reload();

        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.creations, 1);
        assert_eq!(stats.creation_failures, 1);
        assert_eq!(stats.unavailable, 1);
        assert_eq!(stats.secondary_hits, 1);
        assert_eq!(stats.stale_reloads, 1);
    }

    #[test]
    fn test_set_occupancy() {
        let mut stats = CacheStats::new();
        stats.set_occupancy(42, 1024);
        assert_eq!(stats.total_entries, 42);
        assert_eq!(stats.size_bytes, 1024);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["size_bytes"], 0);
    }
}
