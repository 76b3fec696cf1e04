use std::fmt;

use thiserror::Error;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The maximum texture size was set to zero, so no image could ever be
  /// uploaded.
  ZeroMaxTextureSize,
  /// The working-set limit is smaller than the persistent limit, so retained
  /// entries could block every new admission.
  WorkingSetBelowPersistent { working_set: usize, persistent: usize },
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroMaxTextureSize => write!(f, "maximum texture size cannot be zero"),
      BuildError::WorkingSetBelowPersistent {
        working_set,
        persistent,
      } => write!(
        f,
        "working-set limit ({working_set} bytes) is below the persistent limit ({persistent} bytes)"
      ),
    }
  }
}

impl std::error::Error for BuildError {}

/// Failures reported by an [`ImageBackend`](crate::ImageBackend).
///
/// The cache never propagates these; the affected entry is marked failed
/// instead.
#[derive(Debug, Error)]
pub enum BackendError {
  #[error("decode failed: {0}")]
  Decode(String),

  #[error("upload failed: {0}")]
  Upload(String),

  #[error("unsupported image: {0}")]
  Unsupported(String),
}
