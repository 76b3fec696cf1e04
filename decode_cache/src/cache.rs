use crate::backend::{DecodedDrawImage, ImageBackend};
use crate::builder::ImageDecodeCacheBuilder;
use crate::draw_image::DrawImage;
use crate::memory::{MemoryPressureObserver, MemoryState};
use crate::metrics::MetricsSnapshot;
use crate::shared::CacheShared;
use crate::task::work::DecodeRole;
use crate::task::{ImageTask, TaskCategory, TaskResult, TracingInfo};

use std::fmt;
use std::sync::Arc;

/// A cache of decoded and uploaded images sitting in front of an
/// [`ImageBackend`].
///
/// Draw requests that can share one decoded result are coalesced onto one
/// entry and one decode/upload task pair. Memory is bounded by a working-set
/// limit for referenced entries and a persistent limit for idle ones.
///
/// This is a cheap, cloneable handle; clones share the same cache.
pub struct ImageDecodeCache<B: ImageBackend> {
  pub(crate) shared: Arc<CacheShared<B>>,
}

impl<B: ImageBackend> ImageDecodeCache<B> {
  pub fn builder(backend: B) -> ImageDecodeCacheBuilder<B> {
    ImageDecodeCacheBuilder::new(backend)
  }

  pub(crate) fn from_shared(shared: Arc<CacheShared<B>>) -> Self {
    Self { shared }
  }

  pub fn backend(&self) -> &B {
    &self.shared.backend
  }

  /// Takes a reference on the image for `draw` and returns the upload task
  /// that will make it drawable, if one is needed.
  ///
  /// - Already uploaded: `need_unref` with no task.
  /// - In flight: the existing task is shared.
  /// - Otherwise a new upload task is returned, depending on a decode task
  ///   unless the pixels are already locked.
  ///
  /// Empty draws, failed images, images currently decoded at raster and
  /// requests that do not fit the working set get neither a ref nor a task;
  /// callers fall back to [`get_decoded_image_for_draw`](Self::get_decoded_image_for_draw).
  pub fn get_task_for_image_and_ref(&self, draw: &DrawImage<B::Picture>, tracing_info: TracingInfo) -> TaskResult {
    self.shared.get_task_and_ref(draw, tracing_info, DecodeRole::Upload)
  }

  /// Like [`get_task_for_image_and_ref`](Self::get_task_for_image_and_ref),
  /// but only warms the decoded pixels: the returned task is a standalone
  /// decode with no upload behind it.
  pub fn get_out_of_raster_decode_task_for_image_and_ref(&self, draw: &DrawImage<B::Picture>) -> TaskResult {
    let tracing_info = TracingInfo::new(0, TaskCategory::OutOfRaster);
    self.shared.get_task_and_ref(draw, tracing_info, DecodeRole::OutOfRaster)
  }

  /// Releases a reference taken by a successful task acquisition.
  ///
  /// # Panics
  ///
  /// Panics if there is no outstanding reference for `draw`.
  pub fn unref_image(&self, draw: &DrawImage<B::Picture>) {
    self.shared.unref_image(draw);
  }

  /// Returns a drawable image for `draw`, decoding and uploading it on the
  /// calling thread if the cache does not have it yet.
  ///
  /// The caller must hold the GPU context lock and must pair this call with
  /// [`draw_with_image_finished`](Self::draw_with_image_finished).
  pub fn get_decoded_image_for_draw(&self, draw: &DrawImage<B::Picture>) -> DecodedDrawImage<B> {
    self.shared.get_decoded_image_for_draw(draw)
  }

  /// Ends a draw started with [`get_decoded_image_for_draw`](Self::get_decoded_image_for_draw)
  /// and deletes textures that are no longer in use.
  pub fn draw_with_image_finished(&self, draw: &DrawImage<B::Picture>, _decoded: DecodedDrawImage<B>) {
    // Released textures are deleted here, outside the cache lock.
    drop(self.shared.draw_with_image_finished(draw));
  }

  /// Drops every unreferenced entry. Referenced entries are left alone.
  pub fn clear_cache(&self) {
    drop(self.shared.clear());
  }

  /// Deletes textures released since the last deletion. Requires the GPU
  /// context lock.
  pub fn delete_pending_images(&self) {
    drop(self.shared.take_pending_deletion());
  }

  /// Replaces both byte limits and evicts idle entries as needed.
  pub fn set_byte_limits(&self, working_set: usize, persistent: usize) {
    self.shared.set_byte_limits(working_set, persistent);
  }

  pub fn memory_state(&self) -> MemoryState {
    self.shared.memory_state()
  }

  /// Hands `task` to the configured task runner. Returns `false` if the cache
  /// was built without one.
  pub fn schedule(&self, task: &ImageTask) -> bool {
    match &self.shared.task_runner {
      Some(runner) => {
        runner.schedule(task.clone());
        true
      }
      None => false,
    }
  }

  /// Cancels `task` through the configured task runner.
  pub fn cancel(&self, task: &ImageTask) -> bool {
    match &self.shared.task_runner {
      Some(runner) => {
        runner.cancel(task);
        true
      }
      None => false,
    }
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    let (bytes_used, entry_count) = self.shared.usage();
    self.shared.metrics.snapshot(bytes_used, entry_count)
  }
}

impl<B: ImageBackend> MemoryPressureObserver for ImageDecodeCache<B> {
  fn on_memory_state_change(&self, state: MemoryState) {
    drop(self.shared.set_memory_state(state));
  }

  fn on_purge_memory(&self) {
    drop(self.shared.purge());
  }

  fn set_should_aggressively_free_resources(&self, aggressively_free: bool) {
    drop(self.shared.set_aggressively_free(aggressively_free));
  }
}

impl<B: ImageBackend> Clone for ImageDecodeCache<B> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<B: ImageBackend> fmt::Debug for ImageDecodeCache<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (bytes_used, entry_count) = self.shared.usage();
    f.debug_struct("ImageDecodeCache")
      .field("bytes_used", &bytes_used)
      .field("entry_count", &entry_count)
      .field("max_texture_size", &self.shared.max_texture_size)
      .finish_non_exhaustive()
  }
}
