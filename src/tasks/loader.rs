//! Background Loader
//!
//! Loads pool entries off the caller's thread. Requests are served newest
//! first, and a request is dropped once its target has asked for something
//! else.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheKey, Expirable, ExpiringCachePool};
use crate::context::CachePools;
use crate::error::CacheError;
use crate::pools::{ImageKey, TextKey};

/// Identifies whatever displays a loaded entry. A newer request for the same
/// target supersedes older ones.
pub type TargetId = u64;

/// Result delivered for one load request.
#[derive(Debug)]
pub enum LoadOutcome<V> {
    Loaded(Arc<V>),
    /// The key's factory produced nothing
    Unavailable,
    Failed(CacheError),
    /// The target asked for another key, or was cancelled, first
    Superseded,
}

struct Request<K: CacheKey> {
    target: TargetId,
    key: K,
    reply: oneshot::Sender<LoadOutcome<K::Value>>,
}

struct Queue<K: CacheKey> {
    /// Pending requests, newest last
    stack: Vec<Request<K>>,
    /// Key each target asked for last
    wanted: HashMap<TargetId, Wanted<K>>,
}

struct Wanted<K> {
    key: K,
    /// Unserved requests of the target for `key`
    pending: usize,
}

impl<K: CacheKey> Queue<K> {
    fn wants(&self, target: TargetId, key: &K) -> bool {
        matches!(self.wanted.get(&target), Some(wanted) if wanted.key == *key)
    }

    /// Marks one request of `target` for `key` as served.
    fn served(&mut self, target: TargetId, key: &K) {
        let done = match self.wanted.get_mut(&target) {
            Some(wanted) if wanted.key == *key => {
                wanted.pending = wanted.pending.saturating_sub(1);
                wanted.pending == 0
            }
            _ => false,
        };
        if done {
            self.wanted.remove(&target);
        }
    }
}

// == Background Loader ==
/// Last-in-first-out loader over one of the shared pools.
///
/// Requests are queued with [`load`](Self::load) and served by the worker
/// started with [`spawn`](Self::spawn). The pool lookup itself runs on the
/// blocking thread pool.
pub struct BackgroundLoader<K: CacheKey>
where
    K::Value: Expirable,
{
    pools: Arc<CachePools>,
    select: fn(&CachePools) -> &ExpiringCachePool<K>,
    queue: Mutex<Queue<K>>,
    wake: Notify,
}

impl BackgroundLoader<TextKey> {
    /// Loader over the text pool.
    pub fn texts(pools: Arc<CachePools>) -> Arc<Self> {
        Self::new(pools, CachePools::texts)
    }
}

impl BackgroundLoader<ImageKey> {
    /// Loader over the image pool.
    pub fn images(pools: Arc<CachePools>) -> Arc<Self> {
        Self::new(pools, CachePools::images)
    }
}

impl<K: CacheKey> BackgroundLoader<K>
where
    K::Value: Expirable,
{
    /// Creates a loader over the pool picked from `pools` by `select`.
    pub fn new(
        pools: Arc<CachePools>,
        select: fn(&CachePools) -> &ExpiringCachePool<K>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pools,
            select,
            queue: Mutex::new(Queue {
                stack: Vec::new(),
                wanted: HashMap::new(),
            }),
            wake: Notify::new(),
        })
    }

    // == Load ==
    /// Queues a load of `key` for `target`.
    ///
    /// Any earlier request of `target` for a different key is superseded.
    /// The returned receiver yields the outcome once the request is served.
    pub fn load(&self, target: TargetId, key: K) -> oneshot::Receiver<LoadOutcome<K::Value>> {
        let (reply, outcome) = oneshot::channel();
        {
            let mut queue = self.queue.lock();
            if queue.wants(target, &key) {
                if let Some(wanted) = queue.wanted.get_mut(&target) {
                    wanted.pending += 1;
                }
            } else {
                queue.wanted.insert(
                    target,
                    Wanted {
                        key: key.clone(),
                        pending: 1,
                    },
                );
            }
            queue.stack.push(Request { target, key, reply });
        }
        self.wake.notify_one();
        outcome
    }

    /// Withdraws every pending request of `target`.
    pub fn cancel(&self, target: TargetId) {
        self.queue.lock().wanted.remove(&target);
    }

    /// Number of requests not yet served.
    pub fn pending(&self) -> usize {
        self.queue.lock().stack.len()
    }

    // == Worker ==
    /// Starts the worker serving queued requests, newest first.
    ///
    /// Attach the handle to the pools with [`CachePools::attach`] so
    /// shutdown stops it.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            info!("Starting background loader");
            loop {
                let next = loader.queue.lock().stack.pop();
                match next {
                    Some(request) => loader.serve(request).await,
                    None => loader.wake.notified().await,
                }
            }
        })
    }

    async fn serve(self: &Arc<Self>, request: Request<K>) {
        if !self.queue.lock().wants(request.target, &request.key) {
            debug!("Skipping superseded load of {}", request.key.describe());
            let _ = request.reply.send(LoadOutcome::Superseded);
            return;
        }

        let loader = Arc::clone(self);
        let key = request.key.clone();
        let joined =
            tokio::task::spawn_blocking(move || (loader.select)(&loader.pools).try_get(&key))
                .await;
        let outcome = match joined {
            Ok(Ok(Some(value))) => LoadOutcome::Loaded(value),
            Ok(Ok(None)) => LoadOutcome::Unavailable,
            Ok(Err(err)) => LoadOutcome::Failed(err),
            Err(err) => LoadOutcome::Failed(CacheError::Creation(err.to_string())),
        };

        let outcome = {
            let mut queue = self.queue.lock();
            if queue.wants(request.target, &request.key) {
                queue.served(request.target, &request.key);
                outcome
            } else {
                debug!(
                    "Dropping result of {}, target moved on",
                    request.key.describe()
                );
                LoadOutcome::Superseded
            }
        };
        // The requester may have stopped listening
        let _ = request.reply.send(outcome);
    }
}
