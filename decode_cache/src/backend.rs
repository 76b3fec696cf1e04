use crate::draw_image::{ColorSpace, FilterQuality, Picture, Scale};
use crate::error::BackendError;
use crate::key::{MipLevel, QualityTier};

use std::fmt;
use std::sync::Arc;

/// Default upper bound for either texture dimension when the backend does not
/// report one.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 16384;

/// Where the decoded pixels of an entry end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
  /// Decoded, then uploaded to a texture.
  Gpu,
  /// Too large for a texture; the locked pixels are drawn directly.
  Software,
}

/// Everything a backend needs to decode and upload one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeTarget {
  pub mip_level: MipLevel,
  pub width: u32,
  pub height: u32,
  pub color_space: ColorSpace,
  pub quality: QualityTier,
  pub mode: DecodeMode,
  /// Upload should build a full mip chain.
  pub generate_mips: bool,
}

/// The decode/upload capability the cache drives.
///
/// `decode` returns pixels that are already locked. The cache pairs every
/// successful `lock_pixels` (and the initial decode) with one `unlock_pixels`
/// once nothing needs the memory pinned anymore. Backing stores may discard
/// unlocked pixels at any time, after which `lock_pixels` returns `false`.
pub trait ImageBackend: Send + Sync + 'static {
  type Picture: Picture;
  type Pixels: Send + Sync + 'static;
  type Texture: Send + Sync + 'static;

  fn decode(&self, picture: &Self::Picture, target: &DecodeTarget) -> Result<Self::Pixels, BackendError>;

  fn upload(&self, pixels: &Self::Pixels, target: &DecodeTarget) -> Result<Self::Texture, BackendError>;

  /// Re-pins previously decoded pixels. Returns `false` if they were purged.
  fn lock_pixels(&self, pixels: &Self::Pixels) -> bool;

  fn unlock_pixels(&self, pixels: &Self::Pixels);

  fn max_texture_size(&self) -> u32 {
    DEFAULT_MAX_TEXTURE_SIZE
  }
}

/// What a decoded image is backed by.
pub enum ImageBacking<B: ImageBackend> {
  Texture(Arc<B::Texture>),
  Software(Arc<B::Pixels>),
}

impl<B: ImageBackend> Clone for ImageBacking<B> {
  fn clone(&self) -> Self {
    match self {
      ImageBacking::Texture(texture) => ImageBacking::Texture(texture.clone()),
      ImageBacking::Software(pixels) => ImageBacking::Software(pixels.clone()),
    }
  }
}

/// A decoded (and possibly uploaded) image owned by the cache and shared with
/// raster callers.
pub struct DecodedImage<B: ImageBackend> {
  id: u64,
  width: u32,
  height: u32,
  backing: ImageBacking<B>,
}

impl<B: ImageBackend> DecodedImage<B> {
  pub(crate) fn new(id: u64, width: u32, height: u32, backing: ImageBacking<B>) -> Self {
    Self {
      id,
      width,
      height,
      backing,
    }
  }

  /// Unique id of this image; a re-upload gets a new id.
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn backing(&self) -> &ImageBacking<B> {
    &self.backing
  }

  pub fn is_texture_backed(&self) -> bool {
    matches!(self.backing, ImageBacking::Texture(_))
  }

  pub fn texture(&self) -> Option<&Arc<B::Texture>> {
    match &self.backing {
      ImageBacking::Texture(texture) => Some(texture),
      ImageBacking::Software(_) => None,
    }
  }
}

impl<B: ImageBackend> Clone for DecodedImage<B> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      width: self.width,
      height: self.height,
      backing: self.backing.clone(),
    }
  }
}

impl<B: ImageBackend> fmt::Debug for DecodedImage<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DecodedImage")
      .field("id", &self.id)
      .field("width", &self.width)
      .field("height", &self.height)
      .field("texture_backed", &self.is_texture_backed())
      .finish_non_exhaustive()
  }
}

/// The result of [`ImageDecodeCache::get_decoded_image_for_draw`](crate::ImageDecodeCache::get_decoded_image_for_draw).
pub struct DecodedDrawImage<B: ImageBackend> {
  image: Option<DecodedImage<B>>,
  scale_adjustment: Scale,
  filter_quality: FilterQuality,
  is_at_raster_decode: bool,
}

impl<B: ImageBackend> DecodedDrawImage<B> {
  pub(crate) fn new(
    image: Option<DecodedImage<B>>,
    scale_adjustment: Scale,
    filter_quality: FilterQuality,
    is_at_raster_decode: bool,
  ) -> Self {
    Self {
      image,
      scale_adjustment,
      filter_quality,
      is_at_raster_decode,
    }
  }

  /// Nothing to draw.
  pub(crate) fn empty(filter_quality: FilterQuality) -> Self {
    Self::new(None, Scale::IDENTITY, filter_quality, false)
  }

  pub fn image(&self) -> Option<&DecodedImage<B>> {
    self.image.as_ref()
  }

  /// Scale applied to the picture to get the decoded image; the raster
  /// compensates for it.
  pub fn scale_adjustment(&self) -> Scale {
    self.scale_adjustment
  }

  pub fn filter_quality(&self) -> FilterQuality {
    self.filter_quality
  }

  /// The image was decoded synchronously because the cache had not admitted it
  /// ahead of time.
  pub fn is_at_raster_decode(&self) -> bool {
    self.is_at_raster_decode
  }
}

impl<B: ImageBackend> fmt::Debug for DecodedDrawImage<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DecodedDrawImage")
      .field("image", &self.image)
      .field("scale_adjustment", &self.scale_adjustment)
      .field("filter_quality", &self.filter_quality)
      .field("is_at_raster_decode", &self.is_at_raster_decode)
      .finish()
  }
}
