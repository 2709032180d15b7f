//! Background Tasks Module
//!
//! Work run on the async runtime alongside the pools.
//!
//! # Tasks
//! - Reclaim: sweeps the secondary tiers at configured intervals
//! - Background loading: serves pool lookups off the caller's thread,
//!   newest request first

mod loader;
mod reclaim;

pub use loader::{BackgroundLoader, LoadOutcome, TargetId};
pub use reclaim::spawn_reclaim_task;
