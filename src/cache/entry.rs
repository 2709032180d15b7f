//! Cache Entry Module
//!
//! Expiry bookkeeping for entries that go stale after a time-to-live.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

// == Clock ==
/// Source of the current time for expiry checks.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward. Never moves backwards.
    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// == Expiry ==
/// Staleness deadline fixed at construction.
///
/// Once stale, always stale: the first positive check is latched so a clock
/// stepping backwards cannot revive the entry.
pub struct Expiry {
    /// Creation timestamp
    created_at: DateTime<Utc>,
    /// Deadline, None = never goes stale
    expires_at: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    stale: AtomicBool,
}

impl Expiry {
    // == Constructors ==
    /// Creates an expiry `ttl` from now on the wall clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Creates an expiry `ttl` from now on the given clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let created_at = clock.now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| created_at.checked_add_signed(delta));

        Self {
            created_at,
            expires_at,
            clock,
            stale: AtomicBool::new(false),
        }
    }

    /// An expiry that never goes stale.
    pub fn never() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            created_at: clock.now(),
            expires_at: None,
            clock,
            stale: AtomicBool::new(false),
        }
    }

    // == Is Stale ==
    /// True once the current time is strictly past the deadline.
    pub fn is_stale(&self) -> bool {
        if self.stale.load(Ordering::Acquire) {
            return true;
        }
        let stale = match self.expires_at {
            Some(deadline) => self.clock.now() > deadline,
            None => false,
        };
        if stale {
            self.stale.store(true, Ordering::Release);
        }
        stale
    }

    // == Time To Live ==
    /// Remaining time before the entry goes stale, zero once stale, or
    /// None if it never expires.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        let deadline = self.expires_at?;
        if self.is_stale() {
            return Some(Duration::ZERO);
        }
        Some(
            (deadline - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expiry")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("stale", &self.stale.load(Ordering::Relaxed))
            .finish()
    }
}
