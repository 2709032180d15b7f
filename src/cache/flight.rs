//! Single-Flight Module
//!
//! Collapses concurrent creations for the same key into one call.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{CacheError, Result};

// == Call ==
/// Result slot shared by the leader and its followers.
struct Call<T> {
    result: Mutex<Option<Result<T>>>,
    done: Condvar,
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Result<T>) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> Result<T> {
        let mut slot = self.result.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

// == Single Flight ==
/// Per-key in-flight map.
///
/// The first caller for a key becomes the leader and runs the work; callers
/// arriving while it runs block and receive a clone of the leader's result,
/// errors included.
pub struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, Arc<Call<T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    // == Run ==
    /// Runs `work` for `key` unless a call is already in flight, in which
    /// case waits for that call and returns its result.
    pub fn run<F>(&self, key: &K, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let (call, leader) = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => (Arc::clone(call), false),
                None => {
                    let call = Arc::new(Call::new());
                    calls.insert(key.clone(), Arc::clone(&call));
                    (call, true)
                }
            }
        };

        if !leader {
            trace!("Joining in-flight creation");
            return call.wait();
        }

        let guard = LeaderGuard {
            flight: self,
            key,
            call: &call,
        };
        let outcome = work();
        call.publish(outcome.clone());
        drop(guard);
        outcome
    }

    /// Number of keys with a creation in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters the call when the leader finishes, and releases followers
/// with an error if the leader unwinds.
struct LeaderGuard<'a, K: Hash + Eq + Clone, T: Clone> {
    flight: &'a SingleFlight<K, T>,
    key: &'a K,
    call: &'a Arc<Call<T>>,
}

impl<K: Hash + Eq + Clone, T: Clone> Drop for LeaderGuard<'_, K, T> {
    fn drop(&mut self) {
        self.flight.calls.lock().remove(self.key);
        self.call.publish(Err(CacheError::Creation(
            "in-flight creation was abandoned".to_string(),
        )));
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_caller_runs_work() {
        let flight: SingleFlight<&str, u32> = SingleFlight::new();
        let result = flight.run(&"a", || Ok(7));

        assert_eq!(result, Ok(7));
        assert_eq!(flight.in_flight(), 0);
    }

    #[test]
    fn test_concurrent_callers_share_one_call() {
        let flight: Arc<SingleFlight<&str, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    flight.run(&"key", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        Ok(42)
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(42));
        }
        // Late arrivals after the leader finished may start a second call
        assert!(calls.load(Ordering::SeqCst) < 8);
        assert_eq!(flight.in_flight(), 0);
    }

    #[test]
    fn test_errors_fan_out() {
        let flight: SingleFlight<u8, u8> = SingleFlight::new();
        let result = flight.run(&1, || Err(CacheError::Creation("down".to_string())));

        assert_eq!(result, Err(CacheError::Creation("down".to_string())));
    }

    #[test]
    fn test_panicking_leader_releases_followers() {
        let flight: Arc<SingleFlight<u8, u8>> = Arc::new(SingleFlight::new());
        let leader = {
            let flight = Arc::clone(&flight);
            thread::spawn(move || {
                flight.run(&1, || -> Result<u8> {
                    thread::sleep(Duration::from_millis(50));
                    panic!("factory blew up")
                })
            })
        };

        assert!(leader.join().is_err());
        assert_eq!(flight.in_flight(), 0);
        // The key is usable again
        assert_eq!(flight.run(&1, || Ok(3)), Ok(3));
    }
}
