mod common;

use common::*;

use fibre_decode_cache::{
  CacheIntrospection, FilterQuality, ImageDecodeCache, ItemLimits, MemoryPressureObserver, MemoryState, UploadState,
};
use pretty_assertions::assert_eq;

#[test]
fn test_aggressive_free_releases_idle_images() {
  let cache = build_cache();
  let kept = draw(&picture(100, 100), FilterQuality::High, 1.0);
  cache_idle(&cache, &kept);
  assert!(cache.bytes_used() > 0);

  // 1. Turning aggressive freeing on drops every idle upload.
  cache.set_should_aggressively_free_resources(true);
  assert_eq!(cache.bytes_used(), 0);

  // 2. New work is still admitted into the working set, then freed once idle.
  let fresh = draw(&picture(100, 100), FilterQuality::High, 1.0);
  let task = cache.get_task_for_image_and_ref(&fresh, tracing_info()).task.unwrap();
  process_graph(&task);
  assert_eq!(cache.bytes_used(), cache.draw_image_size(&fresh));
  cache.unref_image(&fresh);
  assert_eq!(cache.bytes_used(), 0);

  // 3. Back to normal, idle images stay cached again.
  cache.set_should_aggressively_free_resources(false);
  cache_idle(&cache, &fresh);
  assert_eq!(cache.bytes_used(), cache.draw_image_size(&fresh));
}

#[test]
fn test_suspension_scenario() {
  let cache = build_cache();
  let draw = draw(&picture(1, 1), FilterQuality::Low, 1.0);

  // 1. Cache one image.
  cache_idle(&cache, &draw);
  assert!(cache.bytes_used() > 0);
  assert_eq!(cache.num_cache_entries(), 1);

  // 2. Freeing aggressively drops the budget but keeps the entry.
  cache.set_should_aggressively_free_resources(true);
  assert_eq!(cache.bytes_used(), 0);
  assert_eq!(cache.num_cache_entries(), 1);

  // 3. Purge and suspend: nothing is cached.
  cache.on_purge_memory();
  cache.on_memory_state_change(MemoryState::Suspended);
  assert_eq!(cache.bytes_used(), 0);
  assert_eq!(cache.num_cache_entries(), 0);

  // 4. Suspension does not shrink the working set.
  let task = cache.get_task_for_image_and_ref(&draw, tracing_info()).task;
  assert!(task.is_some());
  process_graph(&task.unwrap());
  cache.unref_image(&draw);
  assert_eq!(cache.bytes_used(), 0);
  assert_eq!(cache.num_cache_entries(), 0);

  // 5. Back to normal, images are cached again.
  cache.on_memory_state_change(MemoryState::Normal);
  cache.set_should_aggressively_free_resources(false);
  let task = cache.get_task_for_image_and_ref(&draw, tracing_info()).task;
  assert!(task.is_some());
  process_graph(&task.unwrap());
  cache.unref_image(&draw);
  assert!(cache.bytes_used() > 0);
  assert_eq!(cache.num_cache_entries(), 1);
}

#[test]
fn test_suspended_drops_all_idle_entries() {
  let cache = build_cache();
  let draws: Vec<_> = (0..2)
    .map(|_| draw(&picture(100, 100), FilterQuality::High, 1.0))
    .collect();
  for draw in &draws {
    cache_idle(&cache, draw);
  }
  assert_eq!(cache.num_cache_entries(), 2);

  // 1. Suspending empties the cache.
  cache.on_memory_state_change(MemoryState::Suspended);
  assert_eq!(cache.memory_state(), MemoryState::Suspended);
  assert_eq!(cache.num_cache_entries(), 0);
  assert_eq!(cache.bytes_used(), 0);

  // 2. Requests still work but leave nothing behind.
  let task = cache.get_task_for_image_and_ref(&draws[0], tracing_info()).task;
  assert!(task.is_some());
  process_graph(&task.unwrap());
  cache.unref_image(&draws[0]);
  assert_eq!(cache.num_cache_entries(), 0);
  assert_eq!(cache.bytes_used(), 0);

  // 3. Resuming caches images again.
  cache.on_memory_state_change(MemoryState::Normal);
  cache_idle(&cache, &draws[1]);
  assert_eq!(cache.num_cache_entries(), 1);
  assert_eq!(cache.upload_state(&draws[1]), Some(UploadState::Uploaded));
}

#[test]
fn test_suspended_keeps_referenced_entries() {
  let cache = build_cache();
  let draw = draw(&picture(100, 100), FilterQuality::High, 1.0);
  let task = cache.get_task_for_image_and_ref(&draw, tracing_info()).task.unwrap();
  process_graph(&task);

  cache.on_memory_state_change(MemoryState::Suspended);
  assert_eq!(cache.num_cache_entries(), 1, "referenced entries survive suspension");
  assert_eq!(cache.bytes_used(), cache.draw_image_size(&draw));

  cache.unref_image(&draw);
  assert_eq!(cache.num_cache_entries(), 0);
  assert_eq!(cache.bytes_used(), 0);
}

#[test]
fn test_throttled_lowers_preferred_count() {
  let cache = ImageDecodeCache::builder(fake_backend())
    .item_limits(ItemLimits {
      normal: 10,
      throttled: 1,
      suspended: 0,
    })
    .build()
    .unwrap();
  let draws: Vec<_> = (0..3)
    .map(|_| draw(&picture(10, 10), FilterQuality::Low, 1.0))
    .collect();
  for draw in &draws {
    cache_idle(&cache, draw);
  }
  assert_eq!(cache.num_cache_entries(), 3);

  cache.on_memory_state_change(MemoryState::Throttled);
  assert_eq!(cache.num_cache_entries(), 1);
  assert_eq!(
    cache.upload_state(&draws[2]),
    Some(UploadState::Uploaded),
    "the most recent entry is kept"
  );
}

#[test]
fn test_purge_empties_cache_without_changing_state() {
  let cache = build_cache();
  let draws: Vec<_> = (0..2)
    .map(|_| draw(&picture(50, 50), FilterQuality::Low, 1.0))
    .collect();
  for draw in &draws {
    cache_idle(&cache, draw);
  }

  cache.on_purge_memory();
  assert_eq!(cache.num_cache_entries(), 0);
  assert_eq!(cache.bytes_used(), 0);
  assert_eq!(cache.memory_state(), MemoryState::Normal);

  cache_idle(&cache, &draws[0]);
  assert_eq!(cache.num_cache_entries(), 1);
}

#[test]
fn test_clear_cache_removes_idle_entries_only() {
  let cache = build_cache();
  let draws: Vec<_> = (0..10)
    .map(|_| draw(&picture(100, 100), FilterQuality::High, 1.0))
    .collect();
  for draw in &draws {
    cache_idle(&cache, draw);
  }
  assert_eq!(cache.num_cache_entries(), 10);

  let held = draw(&picture(100, 100), FilterQuality::High, 1.0);
  let task = cache.get_task_for_image_and_ref(&held, tracing_info()).task.unwrap();
  process_graph(&task);

  cache.clear_cache();
  assert_eq!(cache.num_cache_entries(), 1, "the referenced entry stays");
  assert_eq!(cache.bytes_used(), cache.draw_image_size(&held));
  assert_eq!(cache.metrics().cleared, 10);
  assert_eq!(cache.backend().counters.textures_deleted(), 10);

  cache.unref_image(&held);
}
