use crate::backend::ImageBackend;
use crate::budget::{BudgetTracker, ItemLimits};
use crate::cache::ImageDecodeCache;
use crate::config::{CacheConfig, PixelFormat};
use crate::error::BuildError;
use crate::listener::EvictionListener;
use crate::runtime::TaskRunner;
use crate::shared::CacheShared;
use crate::task::notifier::Notifier;

use core::fmt;
use std::sync::Arc;

/// A builder for creating [`ImageDecodeCache`] instances.
pub struct ImageDecodeCacheBuilder<B: ImageBackend> {
  backend: B,
  config: CacheConfig,
  listener: Option<Arc<dyn EvictionListener>>,
  task_runner: Option<Arc<dyn TaskRunner>>,
}

impl<B: ImageBackend> fmt::Debug for ImageDecodeCacheBuilder<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ImageDecodeCacheBuilder")
      .field("config", &self.config)
      .field("has_listener", &self.listener.is_some())
      .field("has_task_runner", &self.task_runner.is_some())
      .finish_non_exhaustive()
  }
}

impl<B: ImageBackend> ImageDecodeCacheBuilder<B> {
  pub fn new(backend: B) -> Self {
    Self::from_config(backend, CacheConfig::default())
  }

  pub fn from_config(backend: B, config: CacheConfig) -> Self {
    Self {
      backend,
      config,
      listener: None,
      task_runner: None,
    }
  }

  /// Sets the byte limit for entries that are currently referenced.
  pub fn working_set_bytes(mut self, bytes: usize) -> Self {
    self.config.working_set_bytes = bytes;
    self
  }

  /// Sets the byte limit for unreferenced entries kept for reuse.
  pub fn persistent_bytes(mut self, bytes: usize) -> Self {
    self.config.persistent_bytes = bytes;
    self
  }

  pub fn byte_limits(mut self, working_set: usize, persistent: usize) -> Self {
    self.config.working_set_bytes = working_set;
    self.config.persistent_bytes = persistent;
    self
  }

  pub fn pixel_format(mut self, format: PixelFormat) -> Self {
    self.config.pixel_format = format;
    self
  }

  /// Overrides the largest texture dimension reported by the backend. Images
  /// larger than this on either axis stay in software.
  pub fn max_texture_size(mut self, size: u32) -> Self {
    self.config.max_texture_size = Some(size);
    self
  }

  pub fn item_limits(mut self, limits: ItemLimits) -> Self {
    self.config.item_limits = limits;
    self
  }

  /// Sets the eviction listener for the cache.
  pub fn eviction_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: EvictionListener + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Sets the runner used by [`ImageDecodeCache::schedule`].
  pub fn task_runner(mut self, runner: Arc<dyn TaskRunner>) -> Self {
    self.task_runner = Some(runner);
    self
  }

  fn max_texture_size_or_backend(&self) -> u32 {
    self
      .config
      .max_texture_size
      .unwrap_or_else(|| self.backend.max_texture_size())
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.max_texture_size_or_backend() == 0 {
      return Err(BuildError::ZeroMaxTextureSize);
    }
    if self.config.working_set_bytes < self.config.persistent_bytes {
      return Err(BuildError::WorkingSetBelowPersistent {
        working_set: self.config.working_set_bytes,
        persistent: self.config.persistent_bytes,
      });
    }
    Ok(())
  }

  pub fn build(self) -> Result<ImageDecodeCache<B>, BuildError> {
    self.validate()?;

    let max_texture_size = self.max_texture_size_or_backend();
    let budget = BudgetTracker::new(
      self.config.working_set_bytes,
      self.config.persistent_bytes,
      self.config.item_limits,
    );
    let notifier = self.listener.map(Notifier::spawn);

    let shared = CacheShared::new(
      self.backend,
      budget,
      notifier,
      self.task_runner,
      self.config.pixel_format.bytes_per_pixel(),
      max_texture_size,
    );
    Ok(ImageDecodeCache::from_shared(Arc::new(shared)))
  }
}
