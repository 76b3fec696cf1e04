use crate::budget::ItemLimits;

/// Default byte limit for referenced entries.
pub const DEFAULT_WORKING_SET_BYTES: usize = 96 * 1024 * 1024;
/// Default byte limit for unreferenced entries kept for reuse.
pub const DEFAULT_PERSISTENT_BYTES: usize = 96 * 1024 * 1024;

/// Pixel layout of decoded images; determines the bytes charged per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
  #[default]
  Rgba8888,
  Bgra8888,
  Rgba4444,
  Rgb565,
  Alpha8,
}

impl PixelFormat {
  pub fn bytes_per_pixel(self) -> usize {
    match self {
      PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
      PixelFormat::Rgba4444 | PixelFormat::Rgb565 => 2,
      PixelFormat::Alpha8 => 1,
    }
  }
}

/// Plain-data configuration of an [`ImageDecodeCache`](crate::ImageDecodeCache),
/// suitable for loading from a settings file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct CacheConfig {
  pub working_set_bytes: usize,
  pub persistent_bytes: usize,
  pub pixel_format: PixelFormat,
  /// Overrides the backend's maximum texture dimension.
  pub max_texture_size: Option<u32>,
  pub item_limits: ItemLimits,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      working_set_bytes: DEFAULT_WORKING_SET_BYTES,
      persistent_bytes: DEFAULT_PERSISTENT_BYTES,
      pixel_format: PixelFormat::default(),
      max_texture_size: None,
      item_limits: ItemLimits::default(),
    }
  }
}
