use fibre_decode_cache::{
  BackendError, CacheIntrospection, ColorSpace, DecodeTarget, DrawImage, EvictionListener, EvictionReason,
  FilterQuality, ImageBackend, ImageDecodeCache, InlineTaskRunner, MemoryPressureObserver, MemoryState, Picture,
  PictureId, Scale, TaskCategory, TracingInfo,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Photo {
  id: PictureId,
  width: u32,
  height: u32,
}

impl Picture for Photo {
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

// Pixels and textures are plain byte buffers here.
struct VecBackend;

impl ImageBackend for VecBackend {
  type Picture = Photo;
  type Pixels = Vec<u8>;
  type Texture = Vec<u8>;

  fn decode(&self, _picture: &Photo, target: &DecodeTarget) -> Result<Vec<u8>, BackendError> {
    Ok(vec![0xff; (target.width * target.height * 4) as usize])
  }

  fn upload(&self, pixels: &Vec<u8>, _target: &DecodeTarget) -> Result<Vec<u8>, BackendError> {
    Ok(pixels.clone())
  }

  fn lock_pixels(&self, _pixels: &Vec<u8>) -> bool {
    true
  }

  fn unlock_pixels(&self, _pixels: &Vec<u8>) {}
}

struct PrintingListener;

impl EvictionListener for PrintingListener {
  fn on_evict(&self, key: fibre_decode_cache::CacheKey, bytes: usize, reason: EvictionReason) {
    println!("[Listener] {key} released {bytes} bytes: {reason}");
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  println!("--- Rastering one frame through the image decode cache ---");

  let cache = ImageDecodeCache::builder(VecBackend)
    .byte_limits(4 * 1024 * 1024, 1024 * 1024)
    .eviction_listener(PrintingListener)
    .task_runner(Arc::new(InlineTaskRunner))
    .build()
    .expect("Failed to build cache");

  let photos: Vec<_> = (0..4)
    .map(|i| {
      Arc::new(Photo {
        id: PictureId(i),
        width: 512,
        height: 384,
      })
    })
    .collect();
  let draws: Vec<_> = photos
    .iter()
    .map(|photo| DrawImage::full(photo.clone(), FilterQuality::High, Scale::uniform(0.5), ColorSpace::Srgb))
    .collect();

  // 1. Prepare tiles: request every image and run the resulting tasks.
  let tracing_info = TracingInfo::new(1, TaskCategory::Prefetch);
  for draw in &draws {
    let result = cache.get_task_for_image_and_ref(draw, tracing_info);
    match &result.task {
      Some(task) => {
        cache.schedule(task);
        println!("{} -> ran {} ({} deps)", draw.picture_id(), task.kind(), task.dependencies().len());
      }
      None if result.need_unref => println!("{} -> already uploaded", draw.picture_id()),
      None => println!("{} -> will be decoded at raster", draw.picture_id()),
    }
  }
  println!("Working set: {} bytes", cache.bytes_used());

  // 2. Raster: every draw finds its upload.
  for draw in &draws {
    let decoded = cache.get_decoded_image_for_draw(draw);
    println!(
      "Draw {}: at raster = {}, scale adjustment = {:?}",
      draw.picture_id(),
      decoded.is_at_raster_decode(),
      decoded.scale_adjustment()
    );
    cache.draw_with_image_finished(draw, decoded);
  }

  // 3. The frame is done; release the refs taken while preparing tiles.
  for draw in &draws {
    cache.unref_image(draw);
  }
  println!("After the frame: {} bytes in {} entries", cache.bytes_used(), cache.num_cache_entries());

  // 4. The embedder goes into the background.
  cache.on_memory_state_change(MemoryState::Suspended);
  println!("Suspended: {} bytes in {} entries", cache.bytes_used(), cache.num_cache_entries());

  println!("\n--- Final Metrics ---");
  println!("{:#?}", cache.metrics());
}
