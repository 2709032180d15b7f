//! Context Module
//!
//! Owns the process-wide pools and their background tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{
    BoundedCachePool, CacheKey, CacheStats, Expirable, ExpiringCachePool, SoftStore, SweepReport,
};
use crate::config::Config;
use crate::error::Result;
use crate::pools::{ImageLoader, ImagePool, TextLoader, TextPool};
use crate::source::{ByteSource, HttpSource, ImageDecoder};

/// Statistics of both pools, as reported by [`CachePools::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct PoolsStats {
    pub images: CacheStats,
    pub texts: CacheStats,
}

/// Image and text pools built once from [`Config`] and shared by `Arc`.
///
/// Call [`shutdown`](Self::shutdown) when done: it stops attached tasks and
/// empties both pools.
pub struct CachePools {
    images: ImagePool,
    texts: TextPool,
    remote: Arc<dyn ByteSource>,
    text_loader: Arc<TextLoader>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CachePools {
    // == Constructors ==
    /// Builds pools fetching remote resources over HTTP.
    ///
    /// Must not be called from inside an async runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = HttpSource::new(config.http_timeout())?;
        Self::with_source(config, Arc::new(http))
    }

    /// Builds pools fetching remote resources from `remote`.
    pub fn with_source(config: &Config, remote: Arc<dyn ByteSource>) -> Result<Self> {
        config.validate()?;

        let text_loader =
            Arc::new(TextLoader::new(Arc::clone(&remote)).with_ttl(config.text_ttl()));

        info!(
            "Pools ready: images={}B texts={}B secondary={}B single_flight={}",
            config.image_capacity_bytes,
            config.text_capacity_bytes,
            config.secondary_max_bytes,
            config.single_flight
        );

        Ok(Self {
            images: build_pool(config, config.image_capacity_bytes),
            texts: build_pool(config, config.text_capacity_bytes),
            remote,
            text_loader,
            tasks: Mutex::new(Vec::new()),
        })
    }

    // == Accessors ==
    pub fn images(&self) -> &ImagePool {
        &self.images
    }

    pub fn texts(&self) -> &TextPool {
        &self.texts
    }

    /// Loader for text documents using the configured TTL.
    pub fn text_loader(&self) -> Arc<TextLoader> {
        Arc::clone(&self.text_loader)
    }

    /// Loader for images fetched from the remote source and decoded by
    /// `decoder`.
    pub fn image_loader(&self, decoder: Arc<dyn ImageDecoder>) -> ImageLoader {
        ImageLoader::new(Arc::clone(&self.remote), decoder)
    }

    pub fn stats(&self) -> PoolsStats {
        PoolsStats {
            images: self.images.stats(),
            texts: self.texts.stats(),
        }
    }

    // == Maintenance ==
    /// Sweeps the secondary tier of both pools.
    pub fn sweep(&self) -> SweepReport {
        let images = self.images.sweep();
        let texts = self.texts.sweep();
        SweepReport {
            demoted: images.demoted + texts.demoted,
            purged: images.purged + texts.purged,
        }
    }

    /// Releases memory held by both pools. Returns the entries evicted.
    pub fn on_memory_pressure(&self) -> usize {
        self.images.on_memory_pressure() + self.texts.on_memory_pressure()
    }

    /// Ties a background task to these pools so shutdown stops it.
    pub fn attach(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    // == Shutdown ==
    /// Aborts attached tasks and clears both pools.
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        self.images.clear();
        self.texts.clear();
        info!("Pools shut down, {} background tasks stopped", tasks.len());
    }
}

fn build_pool<K: CacheKey>(config: &Config, capacity_bytes: usize) -> ExpiringCachePool<K>
where
    K::Value: Expirable,
{
    let mut bounded = BoundedCachePool::new(capacity_bytes);
    if config.single_flight {
        bounded = bounded.with_single_flight();
    }
    let secondary =
        SoftStore::new(config.secondary_max_bytes).with_max_idle(config.secondary_max_idle());
    ExpiringCachePool::with_tiers(bounded, secondary)
}
