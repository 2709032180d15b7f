//! Tiered Cache - size-bounded object pools with a reclaimable second tier
//!
//! Entries are created lazily from their keys, evicted least-recently-used
//! once a byte budget is exceeded, remembered by a secondary tier after
//! eviction, and reloaded when they go stale.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod pools;
pub mod source;
pub mod tasks;

pub use config::Config;
pub use context::{CachePools, PoolsStats};
pub use error::{CacheError, Result};
pub use tasks::{spawn_reclaim_task, BackgroundLoader, LoadOutcome};
