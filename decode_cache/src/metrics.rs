use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// Counters are updated without holding the cache lock.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Task acquisition ---
  pub(crate) tasks_created: CachePadded<AtomicU64>,
  pub(crate) tasks_coalesced: CachePadded<AtomicU64>,
  pub(crate) upload_hits: CachePadded<AtomicU64>,
  pub(crate) admissions_rejected: CachePadded<AtomicU64>,
  pub(crate) tasks_canceled: CachePadded<AtomicU64>,

  // --- Work performed ---
  pub(crate) decodes: CachePadded<AtomicU64>,
  pub(crate) relocks: CachePadded<AtomicU64>,
  pub(crate) uploads: CachePadded<AtomicU64>,
  pub(crate) failures: CachePadded<AtomicU64>,
  pub(crate) at_raster_draws: CachePadded<AtomicU64>,

  // --- Eviction ---
  pub(crate) orphaned: CachePadded<AtomicU64>,
  pub(crate) evicted_by_capacity: CachePadded<AtomicU64>,
  pub(crate) cleared: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      tasks_created: CachePadded::new(AtomicU64::new(0)),
      tasks_coalesced: CachePadded::new(AtomicU64::new(0)),
      upload_hits: CachePadded::new(AtomicU64::new(0)),
      admissions_rejected: CachePadded::new(AtomicU64::new(0)),
      tasks_canceled: CachePadded::new(AtomicU64::new(0)),
      decodes: CachePadded::new(AtomicU64::new(0)),
      relocks: CachePadded::new(AtomicU64::new(0)),
      uploads: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      at_raster_draws: CachePadded::new(AtomicU64::new(0)),
      orphaned: CachePadded::new(AtomicU64::new(0)),
      evicted_by_capacity: CachePadded::new(AtomicU64::new(0)),
      cleared: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn bump(counter: &CachePadded<AtomicU64>) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot. Byte usage and entry count live under
  /// the cache lock, so the caller supplies them.
  pub(crate) fn snapshot(&self, bytes_used: usize, entry_count: usize) -> MetricsSnapshot {
    let upload_hits = self.upload_hits.load(Ordering::Relaxed);
    let tasks_coalesced = self.tasks_coalesced.load(Ordering::Relaxed);
    let tasks_created = self.tasks_created.load(Ordering::Relaxed);
    let served = upload_hits + tasks_coalesced + tasks_created;

    MetricsSnapshot {
      tasks_created,
      tasks_coalesced,
      upload_hits,
      reuse_ratio: if served == 0 {
        0.0
      } else {
        (upload_hits + tasks_coalesced) as f64 / served as f64
      },
      admissions_rejected: self.admissions_rejected.load(Ordering::Relaxed),
      tasks_canceled: self.tasks_canceled.load(Ordering::Relaxed),
      decodes: self.decodes.load(Ordering::Relaxed),
      relocks: self.relocks.load(Ordering::Relaxed),
      uploads: self.uploads.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      at_raster_draws: self.at_raster_draws.load(Ordering::Relaxed),
      orphaned: self.orphaned.load(Ordering::Relaxed),
      evicted_by_capacity: self.evicted_by_capacity.load(Ordering::Relaxed),
      cleared: self.cleared.load(Ordering::Relaxed),
      bytes_used: bytes_used as u64,
      entry_count: entry_count as u64,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Requests that needed a new task (upload, or decode for out-of-raster).
  pub tasks_created: u64,
  /// Requests that joined an in-flight task.
  pub tasks_coalesced: u64,
  /// Requests for an already uploaded entry.
  pub upload_hits: u64,
  /// Share of requests served without creating a task.
  pub reuse_ratio: f64,
  /// Requests turned away because the working set was full.
  pub admissions_rejected: u64,
  /// Tasks that completed without running.
  pub tasks_canceled: u64,
  /// Full decodes performed by the backend.
  pub decodes: u64,
  /// Decodes avoided by re-locking existing pixels.
  pub relocks: u64,
  /// Texture uploads performed by the backend.
  pub uploads: u64,
  /// Entries marked as permanently failed.
  pub failures: u64,
  /// Draws that had to decode synchronously.
  pub at_raster_draws: u64,
  /// Entries superseded by a better entry for the same picture.
  pub orphaned: u64,
  /// Images freed to stay within the limits.
  pub evicted_by_capacity: u64,
  /// Images freed by clears and purges.
  pub cleared: u64,
  /// Bytes currently budgeted.
  pub bytes_used: u64,
  /// Entries in the persistent cache.
  pub entry_count: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("tasks_created", &self.tasks_created)
      .field("tasks_coalesced", &self.tasks_coalesced)
      .field("upload_hits", &self.upload_hits)
      .field("reuse_ratio", &format!("{:.2}%", self.reuse_ratio * 100.0))
      .field("admissions_rejected", &self.admissions_rejected)
      .field("tasks_canceled", &self.tasks_canceled)
      .field("decodes", &self.decodes)
      .field("relocks", &self.relocks)
      .field("uploads", &self.uploads)
      .field("failures", &self.failures)
      .field("at_raster_draws", &self.at_raster_draws)
      .field("orphaned", &self.orphaned)
      .field("evicted_by_capacity", &self.evicted_by_capacity)
      .field("cleared", &self.cleared)
      .field("bytes_used", &self.bytes_used)
      .field("entry_count", &self.entry_count)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
