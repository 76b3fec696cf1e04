use crate::backend::{DecodeMode, DecodeTarget, DecodedImage, ImageBackend};
use crate::key::CacheKey;
use crate::task::ImageTask;

use std::fmt;
use std::sync::Arc;

/// Whether an entry's decoded pixels are pinned in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
  Unlocked,
  Locked,
}

/// Observable progress of an entry through the decode/upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
  NotStarted,
  Decoding,
  Decoded,
  Uploading,
  Uploaded,
  /// Terminal: the same key never gets a task again.
  Failed,
}

pub(crate) struct DecodeSlot<B: ImageBackend> {
  pub(crate) pixels: Option<Arc<B::Pixels>>,
  pub(crate) lock_state: LockState,
  /// Pins held by pending decode and upload work.
  pub(crate) ref_count: u32,
  pub(crate) in_progress: bool,
  /// Decode feeding this entry's upload.
  pub(crate) task: Option<ImageTask>,
  /// Decode requested outside of raster, with no upload behind it.
  pub(crate) out_of_raster_task: Option<ImageTask>,
}

pub(crate) struct UploadSlot<B: ImageBackend> {
  pub(crate) image: Option<DecodedImage<B>>,
  /// Callers plus upload or out-of-raster tasks holding the image.
  pub(crate) ref_count: u32,
  pub(crate) budgeted: bool,
  pub(crate) in_progress: bool,
  pub(crate) task: Option<ImageTask>,
}

/// The decoded and uploaded representation of one picture at one mip level,
/// quality tier and color space. Owned exclusively by the cache.
pub(crate) struct CacheEntry<B: ImageBackend> {
  /// Key of the request that created the entry.
  pub(crate) key: CacheKey,
  pub(crate) picture: Arc<B::Picture>,
  pub(crate) target: DecodeTarget,
  pub(crate) size: usize,
  pub(crate) in_persistent: bool,
  pub(crate) is_orphaned: bool,
  pub(crate) is_at_raster: bool,
  pub(crate) failed: bool,
  pub(crate) decode: DecodeSlot<B>,
  pub(crate) upload: UploadSlot<B>,
}

impl<B: ImageBackend> CacheEntry<B> {
  pub(crate) fn new(key: CacheKey, picture: Arc<B::Picture>, target: DecodeTarget, size: usize) -> Self {
    Self {
      key,
      picture,
      target,
      size,
      in_persistent: false,
      is_orphaned: false,
      is_at_raster: false,
      failed: false,
      decode: DecodeSlot {
        pixels: None,
        lock_state: LockState::Unlocked,
        ref_count: 0,
        in_progress: false,
        task: None,
        out_of_raster_task: None,
      },
      upload: UploadSlot {
        image: None,
        ref_count: 0,
        budgeted: false,
        in_progress: false,
        task: None,
      },
    }
  }

  pub(crate) fn mode(&self) -> DecodeMode {
    self.target.mode
  }

  pub(crate) fn has_any_refs(&self) -> bool {
    self.upload.ref_count > 0 || self.decode.ref_count > 0
  }

  pub(crate) fn is_locked(&self) -> bool {
    self.decode.lock_state == LockState::Locked
  }

  pub(crate) fn upload_state(&self) -> UploadState {
    if self.failed {
      UploadState::Failed
    } else if self.upload.image.is_some() {
      UploadState::Uploaded
    } else if self.upload.in_progress {
      UploadState::Uploading
    } else if self.decode.in_progress {
      UploadState::Decoding
    } else if self.decode.pixels.is_some() {
      UploadState::Decoded
    } else {
      UploadState::NotStarted
    }
  }
}

impl<B: ImageBackend> fmt::Debug for CacheEntry<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("key", &self.key)
      .field("size", &self.size)
      .field("mode", &self.target.mode)
      .field("upload_state", &self.upload_state())
      .field("lock_state", &self.decode.lock_state)
      .field("ref_count", &self.upload.ref_count)
      .field("decode_ref_count", &self.decode.ref_count)
      .field("budgeted", &self.upload.budgeted)
      .field("orphaned", &self.is_orphaned)
      .field("at_raster", &self.is_at_raster)
      .finish_non_exhaustive()
  }
}
