use crate::key::CacheKey;

use std::fmt;

/// Describes why a decoded image left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// Freed to make room under the byte or entry-count limits.
  Capacity,
  /// Superseded by a larger or better entry for the same picture.
  Orphaned,
  /// Removed by an explicit clear or purge.
  Cleared,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to capacity"),
      EvictionReason::Orphaned => write!(f, "orphaned by a better entry"),
      EvictionReason::Cleared => write!(f, "cleared"),
    }
  }
}

/// A listener that can be registered with the cache to receive notifications
/// when decoded images are evicted.
///
/// `on_evict` receives the key the entry was created for, the bytes it
/// accounted for and the reason. It runs on a dedicated background thread so
/// it never blocks cache operations.
pub trait EvictionListener: Send + Sync {
  fn on_evict(&self, key: CacheKey, bytes: usize, reason: EvictionReason);
}
