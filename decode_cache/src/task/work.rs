use crate::backend::ImageBackend;
use crate::key::CacheKey;
use crate::shared::CacheShared;
use crate::task::{TaskWork, TracingInfo};

use std::sync::Weak;

use generational_arena::Index;

/// Which pipeline a decode task feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeRole {
  /// Produces pixels for an upload task that depends on it.
  Upload,
  /// Warms the cache ahead of a draw; there is no upload behind it.
  OutOfRaster,
}

/// Decodes one entry. Holds a decode ref, plus an image ref when out of
/// raster, released on completion.
pub(crate) struct DecodeWork<B: ImageBackend> {
  cache: Weak<CacheShared<B>>,
  key: CacheKey,
  entry: Index,
  role: DecodeRole,
  tracing_info: TracingInfo,
}

impl<B: ImageBackend> DecodeWork<B> {
  pub(crate) fn new(
    cache: Weak<CacheShared<B>>,
    key: CacheKey,
    entry: Index,
    role: DecodeRole,
    tracing_info: TracingInfo,
  ) -> Self {
    Self {
      cache,
      key,
      entry,
      role,
      tracing_info,
    }
  }
}

impl<B: ImageBackend> TaskWork for DecodeWork<B> {
  fn run(&self) {
    if let Some(cache) = self.cache.upgrade() {
      cache.decode_image(self.entry, self.tracing_info);
    }
  }

  fn complete(&self, was_canceled: bool) {
    if let Some(cache) = self.cache.upgrade() {
      cache.decode_task_completed(&self.key, self.entry, self.role, was_canceled);
    }
  }
}

/// Uploads one entry. Holds an image ref and a decode ref, released on
/// completion.
pub(crate) struct UploadWork<B: ImageBackend> {
  cache: Weak<CacheShared<B>>,
  key: CacheKey,
  entry: Index,
  tracing_info: TracingInfo,
}

impl<B: ImageBackend> UploadWork<B> {
  pub(crate) fn new(cache: Weak<CacheShared<B>>, key: CacheKey, entry: Index, tracing_info: TracingInfo) -> Self {
    Self {
      cache,
      key,
      entry,
      tracing_info,
    }
  }
}

impl<B: ImageBackend> TaskWork for UploadWork<B> {
  fn run(&self) {
    if let Some(cache) = self.cache.upgrade() {
      cache.upload_image(self.entry, self.tracing_info);
    }
  }

  fn complete(&self, was_canceled: bool) {
    if let Some(cache) = self.cache.upgrade() {
      cache.upload_task_completed(&self.key, self.entry, was_canceled);
    }
  }
}
