//! Read-mostly accessors for tests and diagnostics.
//!
//! Production code must not branch on these.

use crate::backend::ImageBackend;
use crate::cache::ImageDecodeCache;
use crate::draw_image::DrawImage;
use crate::entry::UploadState;

/// Introspection hooks implemented alongside the production API.
pub trait CacheIntrospection {
  type Picture: crate::Picture;

  /// Bytes currently charged against the budget.
  fn bytes_used(&self) -> usize;

  /// Entries in the persistent cache.
  fn num_cache_entries(&self) -> usize;

  /// Whether the decoded pixels serving `draw` are pinned.
  fn is_locked(&self, draw: &DrawImage<Self::Picture>) -> bool;

  /// Whether `draw`'s key currently holds any reference.
  fn is_in_use(&self, draw: &DrawImage<Self::Picture>) -> bool;

  /// Bytes an entry for `draw` accounts for.
  fn draw_image_size(&self, draw: &DrawImage<Self::Picture>) -> usize;

  fn upload_state(&self, draw: &DrawImage<Self::Picture>) -> Option<UploadState>;

  /// Marks the entry serving `draw` as permanently failed.
  fn set_image_decoding_failed(&self, draw: &DrawImage<Self::Picture>);

  /// Sets the working-set and persistent limits to the same value.
  fn set_all_byte_limits(&self, bytes: usize);
}

impl<B: ImageBackend> CacheIntrospection for ImageDecodeCache<B> {
  type Picture = B::Picture;

  fn bytes_used(&self) -> usize {
    self.shared.usage().0
  }

  fn num_cache_entries(&self) -> usize {
    self.shared.usage().1
  }

  fn is_locked(&self, draw: &DrawImage<B::Picture>) -> bool {
    self.shared.with_entry(draw, |entry| entry.is_locked()).unwrap_or(false)
  }

  fn is_in_use(&self, draw: &DrawImage<B::Picture>) -> bool {
    self.shared.is_in_use(draw)
  }

  fn draw_image_size(&self, draw: &DrawImage<B::Picture>) -> usize {
    let key = crate::CacheKey::for_draw(draw);
    self.shared.decode_target(draw.picture(), &key).1
  }

  fn upload_state(&self, draw: &DrawImage<B::Picture>) -> Option<UploadState> {
    self.shared.upload_state(draw)
  }

  fn set_image_decoding_failed(&self, draw: &DrawImage<B::Picture>) {
    self.shared.with_entry(draw, |entry| entry.failed = true);
  }

  fn set_all_byte_limits(&self, bytes: usize) {
    self.shared.set_byte_limits(bytes, bytes);
  }
}
