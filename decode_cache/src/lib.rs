//! A concurrent cache of decoded and GPU-uploaded images for rasterizers.
//!
//! # Features
//! - **Request coalescing**: draws that can share one decoded result map to
//!   one cache entry and one decode/upload task pair.
//! - **Task graphs**: acquisition hands back an upload task depending on a
//!   decode task, to be run by any [`TaskRunner`].
//! - **Budgets**: a working-set limit for referenced images and a persistent
//!   limit for idle ones, with least-recently-used eviction.
//! - **At-raster fallback**: draws the cache could not admit are decoded
//!   synchronously and admitted afterwards when room allows.
//! - **Memory pressure**: aggressive-free mode, throttled and suspended states
//!   and purges via [`MemoryPressureObserver`].
//! - **Observability**: `tracing` spans around backend work, metrics snapshots
//!   and an optional [`EvictionListener`].

// Public modules that form the API
pub mod backend;
pub mod budget;
pub mod builder;
pub mod config;
pub mod draw_image;
pub mod entry;
pub mod error;
pub mod key;
pub mod listener;
pub mod memory;
pub mod metrics;
pub mod runtime;
pub mod task;
pub mod testing;

// Internal, crate-only modules
mod cache;
mod policy;
mod shared;

// Re-export the primary user-facing types for convenience
pub use backend::{DecodeMode, DecodeTarget, DecodedDrawImage, DecodedImage, ImageBackend, ImageBacking};
pub use budget::ItemLimits;
pub use builder::ImageDecodeCacheBuilder;
pub use cache::ImageDecodeCache;
pub use config::{CacheConfig, PixelFormat};
pub use draw_image::{ColorSpace, DrawImage, FilterQuality, IntRect, Picture, PictureId, Scale};
pub use entry::{LockState, UploadState};
pub use error::{BackendError, BuildError};
pub use key::{CacheKey, MipLevel, QualityTier};
pub use listener::{EvictionListener, EvictionReason};
pub use memory::{MemoryPressureObserver, MemoryState};
pub use metrics::MetricsSnapshot;
pub use runtime::{InlineTaskRunner, TaskRunner};
#[cfg(feature = "tokio")]
pub use runtime::TokioTaskRunner;
pub use task::{ImageTask, TaskCategory, TaskId, TaskKind, TaskResult, TaskState, TracingInfo};
pub use testing::CacheIntrospection;
