//! Tiered Cache - fetches documents through the text pool
//!
//! Usage: `tiered_cache <url>...`
//!
//! Each URL is read twice; the second read is served from the pool. Pool
//! statistics are printed as JSON on completion.

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Runtime;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::pools::TextKey;
use tiered_cache::tasks::TargetId;
use tiered_cache::{spawn_reclaim_task, BackgroundLoader, CachePools, Config, LoadOutcome};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the pools and start the background reclaim task
/// 4. Fetch every URL twice through the background loader
/// 5. Print statistics and shut down, early on Ctrl+C
///
/// The HTTP client blocks, so it is built outside the async runtime and
/// used only from the background loader's blocking threads.
fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: tiered_cache <url>...");
    }

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: image_capacity={}B, text_capacity={}B, text_ttl={}s, reclaim_interval={}s",
        config.image_capacity_bytes,
        config.text_capacity_bytes,
        config.text_ttl_secs,
        config.reclaim_interval
    );
    debug!("Effective configuration: {}", serde_json::to_string(&config)?);

    let pools = Arc::new(CachePools::from_config(&config).context("failed to build pools")?);
    let runtime = Runtime::new().context("failed to start runtime")?;

    let reclaim = {
        let _guard = runtime.enter();
        spawn_reclaim_task(Arc::clone(&pools), config.reclaim_interval)
    };
    pools.attach(reclaim);
    info!("Background reclaim task started");

    let loader = {
        let _guard = runtime.enter();
        let loader = BackgroundLoader::texts(Arc::clone(&pools));
        pools.attach(loader.spawn());
        loader
    };

    let completed = runtime.block_on(async {
        tokio::select! {
            _ = fetch_all(&loader, &pools, &urls) => true,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating shutdown...");
                false
            }
        }
    });

    let stats = serde_json::to_string_pretty(&pools.stats())?;
    println!("{}", stats);

    pools.shutdown();
    runtime.shutdown_background();
    if !completed {
        warn!("Fetching did not complete");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Reads every URL twice through the text pool, one URL per target.
async fn fetch_all(loader: &BackgroundLoader<TextKey>, pools: &CachePools, urls: &[String]) {
    let keys = pools.text_loader();
    for read in 1..=2 {
        let requests: Vec<_> = urls
            .iter()
            .enumerate()
            .map(|(target, url)| (url, loader.load(target as TargetId, keys.key(url.as_str()))))
            .collect();

        for (url, outcome) in requests {
            match outcome.await {
                Ok(LoadOutcome::Loaded(entry)) => {
                    info!("{} (read {}): {} bytes", url, read, entry.text().len())
                }
                Ok(LoadOutcome::Unavailable) => warn!("{} (read {}): unavailable", url, read),
                Ok(LoadOutcome::Failed(err)) => warn!("{} (read {}): {}", url, read, err),
                Ok(LoadOutcome::Superseded) | Err(_) => {
                    warn!("{} (read {}): request dropped", url, read)
                }
            }
        }
    }
}
