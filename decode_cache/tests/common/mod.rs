#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fibre_decode_cache::{
  BackendError, ColorSpace, DecodeTarget, DrawImage, FilterQuality, ImageBackend, ImageDecodeCache, ImageTask,
  IntRect, Picture, PictureId, Scale, TracingInfo,
};

pub const DEFAULT_BYTES: usize = 96 * 1024 * 1024;
pub const MAX_TEXTURE_SIZE: u32 = 16384;

static NEXT_PICTURE_ID: AtomicU64 = AtomicU64::new(1);

pub struct TestPicture {
  id: PictureId,
  width: u32,
  height: u32,
}

impl Picture for TestPicture {
  fn id(&self) -> PictureId {
    self.id
  }
  fn width(&self) -> u32 {
    self.width
  }
  fn height(&self) -> u32 {
    self.height
  }
}

/// A picture with a fresh id.
pub fn picture(width: u32, height: u32) -> Arc<TestPicture> {
  Arc::new(TestPicture {
    id: PictureId(NEXT_PICTURE_ID.fetch_add(1, Ordering::Relaxed)),
    width,
    height,
  })
}

#[derive(Debug)]
pub struct FakePixels {
  pub width: u32,
  pub height: u32,
  purged: AtomicBool,
}

impl FakePixels {
  /// Simulates the backing store discarding unlocked memory.
  pub fn purge(&self) {
    self.purged.store(true, Ordering::SeqCst);
  }
}

#[derive(Debug)]
pub struct FakeTexture {
  pub width: u32,
  pub height: u32,
  pub has_mips: bool,
  counters: Arc<BackendCounters>,
}

impl Drop for FakeTexture {
  fn drop(&mut self) {
    self.counters.textures_deleted.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Debug, Default)]
pub struct BackendCounters {
  pub decodes: AtomicUsize,
  pub uploads: AtomicUsize,
  pub locks: AtomicUsize,
  pub unlocks: AtomicUsize,
  pub fail_decodes: AtomicBool,
  pub decode_delay_ms: AtomicU64,
  /// Unlocked pixels are discarded right away.
  pub purge_on_unlock: AtomicBool,
  pub textures_deleted: AtomicUsize,
}

impl BackendCounters {
  pub fn decodes(&self) -> usize {
    self.decodes.load(Ordering::SeqCst)
  }
  pub fn uploads(&self) -> usize {
    self.uploads.load(Ordering::SeqCst)
  }
  pub fn locks(&self) -> usize {
    self.locks.load(Ordering::SeqCst)
  }
  pub fn unlocks(&self) -> usize {
    self.unlocks.load(Ordering::SeqCst)
  }
  pub fn textures_deleted(&self) -> usize {
    self.textures_deleted.load(Ordering::SeqCst)
  }
  pub fn fail_decodes(&self) {
    self.fail_decodes.store(true, Ordering::SeqCst);
  }
  pub fn purge_on_unlock(&self) {
    self.purge_on_unlock.store(true, Ordering::SeqCst);
  }
  pub fn slow_decodes(&self, delay: Duration) {
    self.decode_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
  }
}

pub struct FakeBackend {
  pub counters: Arc<BackendCounters>,
}

impl ImageBackend for FakeBackend {
  type Picture = TestPicture;
  type Pixels = FakePixels;
  type Texture = FakeTexture;

  fn decode(&self, _picture: &TestPicture, target: &DecodeTarget) -> Result<FakePixels, BackendError> {
    if self.counters.fail_decodes.load(Ordering::SeqCst) {
      return Err(BackendError::Decode("corrupt data".into()));
    }
    let delay = self.counters.decode_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      thread::sleep(Duration::from_millis(delay));
    }
    self.counters.decodes.fetch_add(1, Ordering::SeqCst);
    Ok(FakePixels {
      width: target.width,
      height: target.height,
      purged: AtomicBool::new(false),
    })
  }

  fn upload(&self, pixels: &FakePixels, target: &DecodeTarget) -> Result<FakeTexture, BackendError> {
    self.counters.uploads.fetch_add(1, Ordering::SeqCst);
    Ok(FakeTexture {
      width: pixels.width,
      height: pixels.height,
      has_mips: target.generate_mips,
      counters: self.counters.clone(),
    })
  }

  fn lock_pixels(&self, pixels: &FakePixels) -> bool {
    self.counters.locks.fetch_add(1, Ordering::SeqCst);
    !pixels.purged.load(Ordering::SeqCst)
  }

  fn unlock_pixels(&self, pixels: &FakePixels) {
    self.counters.unlocks.fetch_add(1, Ordering::SeqCst);
    if self.counters.purge_on_unlock.load(Ordering::SeqCst) {
      pixels.purge();
    }
  }

  fn max_texture_size(&self) -> u32 {
    MAX_TEXTURE_SIZE
  }
}

pub fn fake_backend() -> FakeBackend {
  FakeBackend {
    counters: Arc::new(BackendCounters::default()),
  }
}

pub fn build_cache_with_limits(working_set: usize, persistent: usize) -> ImageDecodeCache<FakeBackend> {
  ImageDecodeCache::builder(fake_backend())
    .byte_limits(working_set, persistent)
    .build()
    .unwrap()
}

pub fn build_cache() -> ImageDecodeCache<FakeBackend> {
  build_cache_with_limits(DEFAULT_BYTES, DEFAULT_BYTES)
}

pub fn draw(picture: &Arc<TestPicture>, quality: FilterQuality, scale: f32) -> DrawImage<TestPicture> {
  DrawImage::full(picture.clone(), quality, Scale::uniform(scale), ColorSpace::Srgb)
}

pub fn draw_in(
  picture: &Arc<TestPicture>,
  quality: FilterQuality,
  scale: f32,
  color_space: ColorSpace,
) -> DrawImage<TestPicture> {
  DrawImage::full(picture.clone(), quality, Scale::uniform(scale), color_space)
}

pub fn draw_rect(picture: &Arc<TestPicture>, src_rect: IntRect, scale: f32) -> DrawImage<TestPicture> {
  DrawImage::new(
    picture.clone(),
    src_rect,
    FilterQuality::High,
    Scale::uniform(scale),
    ColorSpace::Srgb,
  )
}

pub fn tracing_info() -> TracingInfo {
  TracingInfo::default()
}

pub fn schedule_task(task: &ImageTask) {
  assert!(task.schedule(), "task should be new when scheduled");
}

pub fn run_task(task: &ImageTask) {
  assert!(task.run(), "task should run");
}

pub fn cancel_task(task: &ImageTask) {
  assert!(task.cancel(), "task should be cancelable");
}

pub fn complete_task(task: &ImageTask) {
  task.complete();
}

/// Schedules, runs and completes one task (not its dependencies).
pub fn process_task(task: &ImageTask) {
  schedule_task(task);
  run_task(task);
  complete_task(task);
}

/// Requests, runs and releases `draw`, leaving its entry idle in the cache.
pub fn cache_idle(cache: &ImageDecodeCache<FakeBackend>, draw: &DrawImage<TestPicture>) {
  let result = cache.get_task_for_image_and_ref(draw, tracing_info());
  assert!(result.need_unref, "image should be admitted");
  if let Some(task) = result.task {
    process_graph(&task);
  }
  cache.unref_image(draw);
}

/// Processes a task after its dependencies.
pub fn process_graph(task: &ImageTask) {
  for dependency in task.dependencies() {
    if !dependency.is_completed() {
      process_graph(dependency);
    }
  }
  process_task(task);
}
