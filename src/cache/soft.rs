//! Soft Store Module
//!
//! Secondary tier of reclaimable references backing the bounded tier.
//!
//! A reference starts strong and is demoted to a weak one when reclaimed.
//! Demoted references stay queryable: they resolve while some caller still
//! holds the value and report [`SoftLookup::Reclaimed`] once it is gone.
//! Reclamation is deterministic instead of driven by memory pressure:
//! - a byte budget for strongly held values, demoting the least recently
//!   refreshed first
//! - optional idle decay applied by [`SoftStore::sweep`]
//! - [`SoftStore::reclaim_all`] for explicit memory pressure

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::cache::entry::{Clock, SystemClock};
use crate::cache::{Cacheable, LruTracker};

// == Soft Lookup ==
/// Result of querying a secondary reference.
#[derive(Debug)]
pub enum SoftLookup<V> {
    /// The value is still reachable
    Live(Arc<V>),
    /// A reference exists but its value has been reclaimed
    Reclaimed,
    /// No reference for this key
    Absent,
}

impl<V> SoftLookup<V> {
    pub fn live(self) -> Option<Arc<V>> {
        match self {
            SoftLookup::Live(value) => Some(value),
            _ => None,
        }
    }
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Strong references demoted to weak
    pub demoted: usize,
    /// Dead references dropped from the map
    pub purged: usize,
}

enum SoftRef<V> {
    Strong {
        value: Arc<V>,
        cost: usize,
        refreshed_at: DateTime<Utc>,
    },
    Weak(Weak<V>),
}

struct SoftState<K, V> {
    refs: HashMap<K, SoftRef<V>>,
    /// Strong references only, by refresh time
    order: LruTracker<K>,
    strong_bytes: usize,
}

impl<K: Hash + Eq + Clone, V> SoftState<K, V> {
    fn demote(&mut self, key: &K) -> bool {
        let (weak, cost) = match self.refs.get(key) {
            Some(SoftRef::Strong { value, cost, .. }) => (Arc::downgrade(value), *cost),
            _ => return false,
        };
        self.refs.insert(key.clone(), SoftRef::Weak(weak));
        self.strong_bytes -= cost;
        self.order.remove(key);
        true
    }

    fn demote_over_budget(&mut self, max_bytes: usize) -> usize {
        let mut demoted = 0;
        while self.strong_bytes > max_bytes {
            let Some(oldest) = self.order.peek_oldest().cloned() else {
                break;
            };
            if self.demote(&oldest) {
                demoted += 1;
            } else {
                self.order.remove(&oldest);
            }
        }
        demoted
    }

    fn forget(&mut self, key: &K) {
        if let Some(SoftRef::Strong { cost, .. }) = self.refs.remove(key) {
            self.strong_bytes -= cost;
            self.order.remove(key);
        }
    }
}

// == Soft Store ==
/// Concurrent map from key to reclaimable reference.
pub struct SoftStore<K, V> {
    state: Mutex<SoftState<K, V>>,
    max_strong_bytes: usize,
    max_idle: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<K, V> SoftStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Cacheable,
{
    // == Constructor ==
    /// Creates a store keeping at most `max_strong_bytes` strongly reachable.
    pub fn new(max_strong_bytes: usize) -> Self {
        Self {
            state: Mutex::new(SoftState {
                refs: HashMap::new(),
                order: LruTracker::new(),
                strong_bytes: 0,
            }),
            max_strong_bytes,
            max_idle: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Demotes references not refreshed for `max_idle` on each sweep.
    pub fn with_max_idle(mut self, max_idle: Option<Duration>) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // == Refresh ==
    /// Points the reference for `key` at `value`, replacing any previous one.
    pub fn refresh(&self, key: K, value: Arc<V>) {
        let cost = value.byte_cost();
        let now = self.clock.now();
        let mut state = self.state.lock();

        state.forget(&key);
        state.order.touch(&key);
        state.refs.insert(
            key,
            SoftRef::Strong {
                value,
                cost,
                refreshed_at: now,
            },
        );
        state.strong_bytes += cost;
        state.demote_over_budget(self.max_strong_bytes);
    }

    // == Lookup ==
    /// Resolves the reference for `key`. A live strong reference counts as
    /// a use and is refreshed.
    pub fn lookup(&self, key: &K) -> SoftLookup<V> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let value = match state.refs.get_mut(key) {
            None => return SoftLookup::Absent,
            Some(SoftRef::Weak(weak)) => {
                return weak
                    .upgrade()
                    .map_or(SoftLookup::Reclaimed, SoftLookup::Live);
            }
            Some(SoftRef::Strong {
                value,
                refreshed_at,
                ..
            }) => {
                *refreshed_at = now;
                Arc::clone(value)
            }
        };

        state.order.touch(key);
        SoftLookup::Live(value)
    }

    // == Remove ==
    pub fn remove(&self, key: &K) {
        self.state.lock().forget(key);
    }

    // == Clear ==
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.refs.clear();
        state.order.clear();
        state.strong_bytes = 0;
    }

    // == Sweep ==
    /// Applies idle decay, then drops references whose value is gone.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let mut report = SweepReport::default();

        if let Some(max_idle) = self.max_idle.and_then(|d| TimeDelta::from_std(d).ok()) {
            let idle: Vec<K> = state
                .order
                .iter_oldest_first()
                .filter(|key| match state.refs.get(*key) {
                    Some(SoftRef::Strong { refreshed_at, .. }) => now - *refreshed_at > max_idle,
                    _ => false,
                })
                .cloned()
                .collect();
            for key in idle {
                if state.demote(&key) {
                    report.demoted += 1;
                }
            }
        }

        report.purged = purge(&mut state);
        report
    }

    // == Reclaim All ==
    /// Demotes every strong reference, as under memory pressure.
    pub fn reclaim_all(&self) -> usize {
        let mut state = self.state.lock();
        let strong: Vec<K> = state.order.iter_oldest_first().cloned().collect();
        strong.iter().filter(|key| state.demote(key)).count()
    }

    /// Drops references whose value has been reclaimed.
    pub fn purge_reclaimed(&self) -> usize {
        purge(&mut self.state.lock())
    }

    /// Number of references, live or reclaimed.
    pub fn len(&self) -> usize {
        self.state.lock().refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().refs.is_empty()
    }

    /// Number of strongly held references.
    pub fn strong_len(&self) -> usize {
        self.state.lock().order.len()
    }

    /// Bytes held through strong references.
    pub fn strong_bytes(&self) -> usize {
        self.state.lock().strong_bytes
    }

    pub fn max_strong_bytes(&self) -> usize {
        self.max_strong_bytes
    }
}

fn purge<K: Hash + Eq, V>(state: &mut SoftState<K, V>) -> usize {
    let before = state.refs.len();
    state.refs.retain(|_, slot| match slot {
        SoftRef::Strong { .. } => true,
        SoftRef::Weak(weak) => weak.strong_count() > 0,
    });
    before - state.refs.len()
}
