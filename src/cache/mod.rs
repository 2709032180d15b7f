//! Cache Module
//!
//! Generic two-tier caching: a size-bounded LRU tier that creates entries
//! lazily from their keys, and an expiring pool that backs it with a
//! reclaimable secondary tier and drops stale entries on read.

mod bounded;
pub mod entry;
mod expiring;
pub mod flight;
mod lru;
pub mod soft;
mod stats;
mod traits;


// Re-export public types
pub use bounded::{BoundedCachePool, Lookup};
pub use entry::{Clock, Expiry, ManualClock, SystemClock};
pub use expiring::{ExpiringCachePool, SECONDARY_BUDGET_FACTOR};
pub use lru::LruTracker;
pub use soft::{SoftLookup, SoftStore, SweepReport};
pub use stats::CacheStats;
pub use traits::{CacheKey, Cacheable, Expirable};
