use crate::memory::MemoryState;

/// Preferred number of persistent entries while [`MemoryState::Normal`].
pub const NORMAL_MAX_ITEMS: usize = 2000;
/// Preferred number of persistent entries while [`MemoryState::Throttled`].
pub const THROTTLED_MAX_ITEMS: usize = 100;
/// Preferred number of persistent entries while [`MemoryState::Suspended`].
pub const SUSPENDED_MAX_ITEMS: usize = 0;

/// Preferred persistent entry counts per memory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemLimits {
  pub normal: usize,
  pub throttled: usize,
  pub suspended: usize,
}

impl Default for ItemLimits {
  fn default() -> Self {
    Self {
      normal: NORMAL_MAX_ITEMS,
      throttled: THROTTLED_MAX_ITEMS,
      suspended: SUSPENDED_MAX_ITEMS,
    }
  }
}

impl ItemLimits {
  pub fn for_state(&self, state: MemoryState) -> usize {
    match state {
      MemoryState::Normal => self.normal,
      MemoryState::Throttled => self.throttled,
      MemoryState::Suspended => self.suspended,
    }
  }
}

/// Byte accounting for budgeted entries.
///
/// Only lives inside the cache mutex, so it needs no atomics.
#[derive(Debug)]
pub(crate) struct BudgetTracker {
  bytes_used: usize,
  working_set_limit: usize,
  persistent_limit: usize,
  item_limits: ItemLimits,
  memory_state: MemoryState,
  aggressively_free: bool,
}

impl BudgetTracker {
  pub(crate) fn new(working_set_limit: usize, persistent_limit: usize, item_limits: ItemLimits) -> Self {
    Self {
      bytes_used: 0,
      working_set_limit,
      persistent_limit,
      item_limits,
      memory_state: MemoryState::Normal,
      aggressively_free: false,
    }
  }

  pub(crate) fn bytes_used(&self) -> usize {
    self.bytes_used
  }

  /// Effective persistent limit: zero while freeing aggressively or suspended.
  pub(crate) fn persistent_limit(&self) -> usize {
    if self.aggressively_free || self.memory_state == MemoryState::Suspended {
      0
    } else {
      self.persistent_limit
    }
  }

  pub(crate) fn memory_state(&self) -> MemoryState {
    self.memory_state
  }

  pub(crate) fn max_items(&self) -> usize {
    self.item_limits.for_state(self.memory_state)
  }

  pub(crate) fn can_fit_in_cache(&self, size: usize) -> bool {
    self
      .bytes_used
      .checked_add(size)
      .is_some_and(|total| total <= self.persistent_limit())
  }

  pub(crate) fn can_fit_in_working_set(&self, size: usize) -> bool {
    self
      .bytes_used
      .checked_add(size)
      .is_some_and(|total| total <= self.working_set_limit)
  }

  pub(crate) fn exceeds_preferred_count(&self, entry_count: usize) -> bool {
    entry_count > self.max_items()
  }

  pub(crate) fn charge(&mut self, size: usize) {
    self.bytes_used = self.bytes_used.saturating_add(size);
  }

  pub(crate) fn release(&mut self, size: usize) {
    assert!(
      self.bytes_used >= size,
      "releasing {size} bytes with only {} budgeted",
      self.bytes_used
    );
    self.bytes_used -= size;
  }

  pub(crate) fn set_limits(&mut self, working_set_limit: usize, persistent_limit: usize) {
    self.working_set_limit = working_set_limit;
    self.persistent_limit = persistent_limit;
  }

  pub(crate) fn set_memory_state(&mut self, state: MemoryState) {
    self.memory_state = state;
  }

  pub(crate) fn set_aggressively_free(&mut self, aggressively_free: bool) {
    self.aggressively_free = aggressively_free;
  }
}
