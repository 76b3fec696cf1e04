use std::fmt;

/// Coarse memory pressure state reported by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryState {
  #[default]
  Normal,
  /// Memory is scarce; keep far fewer unreferenced entries around.
  Throttled,
  /// Nothing unreferenced is retained and the persistent limit is zero.
  /// Requests are still admitted against the working set.
  Suspended,
}

impl fmt::Display for MemoryState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MemoryState::Normal => write!(f, "normal"),
      MemoryState::Throttled => write!(f, "throttled"),
      MemoryState::Suspended => write!(f, "suspended"),
    }
  }
}

/// Receiver of memory-pressure signals.
///
/// [`ImageDecodeCache`](crate::ImageDecodeCache) implements this so the
/// embedder can register it with whatever pressure source it has.
pub trait MemoryPressureObserver: Send + Sync {
  fn on_memory_state_change(&self, state: MemoryState);

  /// Drops everything unreferenced right away without changing the state.
  fn on_purge_memory(&self);

  fn set_should_aggressively_free_resources(&self, aggressively_free: bool);
}
