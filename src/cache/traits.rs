//! Cache Contracts Module
//!
//! Capability traits describing what can be cached, what can go stale and
//! how a key materializes its own entry.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Result;

// == Cacheable ==
/// A value that can live in a pool.
///
/// The cost is charged against the pool capacity while the value is
/// resident. It must be a pure function of the content and stay constant for
/// the value's lifetime. A zero cost keeps the value resident without
/// consuming capacity.
pub trait Cacheable {
    /// Cost in bytes.
    fn byte_cost(&self) -> usize;
}

// == Expirable ==
/// A cacheable value that can go stale.
///
/// Once `is_stale` has returned `true` for an instance it must keep
/// returning `true`.
pub trait Expirable: Cacheable {
    fn is_stale(&self) -> bool;
}

// == Cache Key ==
/// Identity of a cacheable artifact plus the factory that builds it.
///
/// Equality and hashing must only consider the identifying fields. Two equal
/// keys must always produce interchangeable values.
///
/// # Example
///
/// ```
/// use tiered_cache::cache::{CacheKey, Cacheable};
/// use tiered_cache::error::Result;
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Greeting(String);
///
/// struct Text(String);
///
/// impl Cacheable for Text {
///     fn byte_cost(&self) -> usize {
///         self.0.len()
///     }
/// }
///
/// impl CacheKey for Greeting {
///     type Value = Text;
///
///     fn create_entry(&self) -> Result<Option<Text>> {
///         Ok(Some(Text(format!("hello {}", self.0))))
///     }
/// }
/// ```
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {
    /// The value type this key materializes.
    type Value: Cacheable + Send + Sync + 'static;

    /// Builds the entry for this key.
    ///
    /// Called on a miss, possibly by several threads at once for the same
    /// key. `Ok(None)` means the artifact is unavailable and nothing is
    /// cached; the next lookup calls the factory again.
    fn create_entry(&self) -> Result<Option<Self::Value>>;

    /// Short identifier used in log lines.
    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}
