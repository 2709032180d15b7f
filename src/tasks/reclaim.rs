//! Reclaim Task
//!
//! Background task that periodically sweeps the secondary tiers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::context::CachePools;

/// Spawns a background task that sweeps both pools' secondary tiers.
///
/// Each run demotes references idle for longer than the configured limit
/// and drops references whose value is gone.
///
/// # Arguments
/// * `pools` - Pools to maintain
/// * `interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task. Attach it to the pools with
/// [`CachePools::attach`] so [`CachePools::shutdown`] aborts it.
pub fn spawn_reclaim_task(pools: Arc<CachePools>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting reclaim task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let report = pools.sweep();
            if report.demoted > 0 || report.purged > 0 {
                info!(
                    "Reclaim: demoted {} idle references, purged {} dead references",
                    report.demoted, report.purged
                );
            } else {
                debug!("Reclaim: nothing to reclaim");
            }
        }
    })
}
