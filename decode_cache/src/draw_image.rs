use crate::key::MIN_DRAW_SCALE;

use std::fmt;
use std::sync::Arc;

/// Stable identity of a picture. Two pictures with the same id are assumed to
/// produce identical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PictureId(pub u64);

impl fmt::Display for PictureId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "picture#{}", self.0)
  }
}

/// An encoded or software-backed picture that can be decoded by an
/// [`ImageBackend`](crate::ImageBackend).
pub trait Picture: Send + Sync + 'static {
  fn id(&self) -> PictureId;
  fn width(&self) -> u32;
  fn height(&self) -> u32;
}

/// Filter quality requested by the rasterizer, ordered from cheapest to most
/// expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterQuality {
  None,
  Low,
  Medium,
  High,
}

/// Target color space of a decode. No bucketing is applied: different
/// values never share a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorSpace {
  Srgb,
  LinearSrgb,
  DisplayP3,
  XyzD50,
  /// A color space identified by an embedder-assigned id.
  Custom(u32),
}

impl Default for ColorSpace {
  fn default() -> Self {
    ColorSpace::Srgb
  }
}

/// An integer rectangle in picture space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntRect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl IntRect {
  pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self { x, y, width, height }
  }

  pub const fn from_size(width: u32, height: u32) -> Self {
    Self::new(0, 0, width as i32, height as i32)
  }

  pub fn is_empty(&self) -> bool {
    self.width <= 0 || self.height <= 0
  }

  fn right(&self) -> i64 {
    self.x as i64 + self.width as i64
  }

  fn bottom(&self) -> i64 {
    self.y as i64 + self.height as i64
  }

  /// Whether the two rectangles share a non-empty area.
  pub fn intersects(&self, other: &IntRect) -> bool {
    if self.is_empty() || other.is_empty() {
      return false;
    }
    (self.x as i64) < other.right()
      && (other.x as i64) < self.right()
      && (self.y as i64) < other.bottom()
      && (other.y as i64) < self.bottom()
  }
}

/// Per-axis scale of a draw. Components may be negative for mirrored draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
  pub x: f32,
  pub y: f32,
}

impl Scale {
  pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };

  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub const fn uniform(scale: f32) -> Self {
    Self { x: scale, y: scale }
  }

  pub fn abs(&self) -> Scale {
    Scale::new(self.x.abs(), self.y.abs())
  }
}

impl Default for Scale {
  fn default() -> Self {
    Scale::IDENTITY
  }
}

/// One intended draw of a picture: which part, at what scale, quality and
/// color space.
pub struct DrawImage<P: Picture> {
  picture: Arc<P>,
  src_rect: IntRect,
  quality: FilterQuality,
  scale: Scale,
  color_space: ColorSpace,
}

impl<P: Picture> DrawImage<P> {
  pub fn new(
    picture: Arc<P>,
    src_rect: IntRect,
    quality: FilterQuality,
    scale: Scale,
    color_space: ColorSpace,
  ) -> Self {
    Self {
      picture,
      src_rect,
      quality,
      scale,
      color_space,
    }
  }

  /// A draw of the whole picture.
  pub fn full(picture: Arc<P>, quality: FilterQuality, scale: Scale, color_space: ColorSpace) -> Self {
    let src_rect = IntRect::from_size(picture.width(), picture.height());
    Self::new(picture, src_rect, quality, scale, color_space)
  }

  pub fn picture(&self) -> &Arc<P> {
    &self.picture
  }

  pub fn picture_id(&self) -> PictureId {
    self.picture.id()
  }

  pub fn src_rect(&self) -> IntRect {
    self.src_rect
  }

  pub fn quality(&self) -> FilterQuality {
    self.quality
  }

  pub fn scale(&self) -> Scale {
    self.scale
  }

  pub fn color_space(&self) -> ColorSpace {
    self.color_space
  }

  /// Whether this draw has nothing to decode: the source rectangle misses the
  /// picture or one of the scale components is (nearly) zero.
  pub(crate) fn is_empty_draw(&self) -> bool {
    let bounds = IntRect::from_size(self.picture.width(), self.picture.height());
    if !self.src_rect.intersects(&bounds) {
      return true;
    }
    let scale = self.scale.abs();
    scale.x < MIN_DRAW_SCALE || scale.y < MIN_DRAW_SCALE
  }
}

impl<P: Picture> Clone for DrawImage<P> {
  fn clone(&self) -> Self {
    Self {
      picture: self.picture.clone(),
      src_rect: self.src_rect,
      quality: self.quality,
      scale: self.scale,
      color_space: self.color_space,
    }
  }
}

impl<P: Picture> fmt::Debug for DrawImage<P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DrawImage")
      .field("picture", &self.picture.id())
      .field("src_rect", &self.src_rect)
      .field("quality", &self.quality)
      .field("scale", &self.scale)
      .field("color_space", &self.color_space)
      .finish()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_rect_intersection() {
    let bounds = IntRect::from_size(100, 100);
    assert!(bounds.intersects(&IntRect::new(50, 50, 100, 100)));
    assert!(!bounds.intersects(&IntRect::new(150, 150, 100, 100)), "disjoint rects");
    assert!(!bounds.intersects(&IntRect::new(100, 0, 10, 10)), "touching edges do not intersect");
    assert!(!bounds.intersects(&IntRect::new(0, 0, 0, 10)), "empty rect never intersects");
  }
}
