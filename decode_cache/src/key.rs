use crate::draw_image::{ColorSpace, DrawImage, FilterQuality, Picture, PictureId, Scale};

use std::fmt;

/// Highest filter quality that gets its own cache tier. Anything above is
/// served by the entry decoded for this quality.
pub const MAX_CACHED_QUALITY: FilterQuality = FilterQuality::Medium;

/// Mip dimensions never shrink below this many pixels on either axis.
pub const MIN_MIP_DIMENSION: u32 = 1;

/// A scale component below this magnitude yields an empty draw.
pub const MIN_DRAW_SCALE: f32 = f32::EPSILON;

/// The quality a cache entry is decoded for.
///
/// Requested [`FilterQuality`] is collapsed with [`MAX_CACHED_QUALITY`] so
/// that at most three tiers ever exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
  None,
  Low,
  Medium,
}

impl QualityTier {
  pub fn from_requested(quality: FilterQuality) -> Self {
    match quality.min(MAX_CACHED_QUALITY) {
      FilterQuality::None => QualityTier::None,
      FilterQuality::Low => QualityTier::Low,
      FilterQuality::Medium | FilterQuality::High => QualityTier::Medium,
    }
  }

  /// The filter quality a raster should use when drawing an entry of this tier.
  pub fn filter_quality(self) -> FilterQuality {
    match self {
      QualityTier::None => FilterQuality::None,
      QualityTier::Low => FilterQuality::Low,
      QualityTier::Medium => FilterQuality::Medium,
    }
  }
}

/// A bucketed scale expressed as a mip level: level `n` is the picture halved
/// `n` times on each axis (clamped to [`MIN_MIP_DIMENSION`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MipLevel(pub u32);

impl MipLevel {
  pub const FULL: MipLevel = MipLevel(0);

  /// Picks the deepest level whose dimensions still cover the scaled size of
  /// `width`x`height` on both axes.
  pub fn for_scale(width: u32, height: u32, scale: Scale) -> Self {
    let scale = scale.abs();
    let target_w = (width as f64 * scale.x as f64).ceil();
    let target_h = (height as f64 * scale.y as f64).ceil();

    let (mut w, mut h) = (width, height);
    let mut level = 0;
    while w > MIN_MIP_DIMENSION || h > MIN_MIP_DIMENSION {
      let next_w = (w / 2).max(MIN_MIP_DIMENSION);
      let next_h = (h / 2).max(MIN_MIP_DIMENSION);
      if (next_w as f64) < target_w || (next_h as f64) < target_h {
        break;
      }
      w = next_w;
      h = next_h;
      level += 1;
    }
    MipLevel(level)
  }

  /// Dimensions of `width`x`height` at this level.
  pub fn size_of(self, width: u32, height: u32) -> (u32, u32) {
    let shrink = |d: u32| d.checked_shr(self.0).unwrap_or(0).max(MIN_MIP_DIMENSION);
    (shrink(width), shrink(height))
  }

  /// Ratio between the mip dimensions and the original ones, per axis.
  pub fn scale_adjustment(self, width: u32, height: u32) -> Scale {
    if width == 0 || height == 0 {
      return Scale::IDENTITY;
    }
    let (mip_w, mip_h) = self.size_of(width, height);
    Scale::new(mip_w as f32 / width as f32, mip_h as f32 / height as f32)
  }
}

impl fmt::Display for MipLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "mip{}", self.0)
  }
}

/// Identifies which draws may share one decoded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub picture_id: PictureId,
  pub bucketed_scale: MipLevel,
  pub quality_tier: QualityTier,
  pub color_space: ColorSpace,
  /// The draw samples a downscaled image with mipmap filtering, so the upload
  /// should carry a mip chain.
  pub mip_required: bool,
}

impl CacheKey {
  pub fn for_draw<P: Picture>(draw: &DrawImage<P>) -> Self {
    let picture = draw.picture();
    let quality_tier = QualityTier::from_requested(draw.quality());
    let scale = draw.scale().abs();
    Self {
      picture_id: picture.id(),
      bucketed_scale: MipLevel::for_scale(picture.width(), picture.height(), draw.scale()),
      quality_tier,
      color_space: draw.color_space(),
      mip_required: quality_tier == QualityTier::Medium && (scale.x < 1.0 || scale.y < 1.0),
    }
  }

  /// Whether an entry decoded for `self` can serve a request for `request`:
  /// at least as large, at least as good and in the same color space.
  pub fn can_serve(&self, request: &CacheKey) -> bool {
    self.picture_id == request.picture_id
      && self.bucketed_scale <= request.bucketed_scale
      && self.quality_tier >= request.quality_tier
      && self.color_space == request.color_space
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}@{}/{:?}/{:?}",
      self.picture_id, self.bucketed_scale, self.quality_tier, self.color_space
    )
  }
}
