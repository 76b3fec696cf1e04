mod common;

use common::*;

use fibre_decode_cache::{CacheIntrospection, FilterQuality, Scale, UploadState};
use pretty_assertions::assert_eq;

#[test]
fn test_at_raster_decode_with_zero_budget() {
  let cache = build_cache_with_limits(0, 0);
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, 1.0);

  // 1. No room to admit the image ahead of raster.
  let result = cache.get_task_for_image_and_ref(&draw, tracing_info());
  assert!(!result.need_unref);
  assert!(result.task.is_none());
  assert_eq!(cache.metrics().admissions_rejected, 1);

  // 2. The draw decodes and uploads synchronously.
  let decoded = cache.get_decoded_image_for_draw(&draw);
  assert!(decoded.is_at_raster_decode());
  let texture = decoded.image().and_then(|image| image.texture()).expect("texture backed");
  assert_eq!((texture.width, texture.height), (100, 100));

  // 3. Nothing fits afterwards, so the texture is deleted when the draw ends.
  cache.draw_with_image_finished(&draw, decoded);
  assert_eq!(cache.bytes_used(), 0);
  assert_eq!(cache.backend().counters.textures_deleted(), 1);
  assert_eq!(cache.metrics().at_raster_draws, 1);
}

#[test]
fn test_at_raster_image_admitted_when_room_allows() {
  let cache = build_cache();
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, 1.0);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  assert!(decoded.is_at_raster_decode());
  assert_eq!(cache.bytes_used(), 0, "at-raster images are not budgeted while drawn");
  cache.draw_with_image_finished(&draw, decoded);
  assert_eq!(cache.bytes_used(), cache.draw_image_size(&draw));

  // The admitted upload serves later requests directly.
  let (need_unref, task) = cache.get_task_for_image_and_ref(&draw, tracing_info()).into_parts();
  assert!(need_unref);
  assert!(task.is_none());
  cache.unref_image(&draw);
  assert_eq!(cache.backend().counters.uploads(), 1);
}

#[test]
fn test_uploaded_image_is_not_decoded_at_raster() {
  let cache = build_cache();
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, 0.5);

  let task = cache.get_task_for_image_and_ref(&draw, tracing_info()).task.unwrap();
  process_graph(&task);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  assert!(!decoded.is_at_raster_decode());
  assert!(decoded.image().is_some());
  cache.draw_with_image_finished(&draw, decoded);
  cache.unref_image(&draw);

  let counters = &cache.backend().counters;
  assert_eq!((counters.decodes(), counters.uploads()), (1, 1));
  assert_eq!(cache.metrics().at_raster_draws, 0);
}

#[test]
fn test_at_raster_image_gets_no_task_while_drawn() {
  let cache = build_cache();
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, 1.0);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  let result = cache.get_task_for_image_and_ref(&draw, tracing_info());
  assert!(!result.need_unref, "images being decoded at raster get no task");
  assert!(result.task.is_none());
  cache.draw_with_image_finished(&draw, decoded);

  let result = cache.get_task_for_image_and_ref(&draw, tracing_info());
  assert!(result.need_unref);
  cache.unref_image(&draw);
}

#[test]
fn test_large_image_stays_in_software() {
  let cache = build_cache();
  let image = picture(1, 24000);
  let draw = draw(&image, FilterQuality::High, 1.0);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  let decoded_image = decoded.image().expect("software image");
  assert!(!decoded_image.is_texture_backed());
  assert_eq!((decoded_image.width(), decoded_image.height()), (1, 24000));
  cache.draw_with_image_finished(&draw, decoded);

  assert_eq!(cache.backend().counters.uploads(), 0, "software images are never uploaded");
  assert!(!cache.is_locked(&draw));
}

#[test]
fn test_large_image_is_scaled_into_software() {
  let cache = build_cache();
  let image = picture(1, 48000);
  let draw = draw(&image, FilterQuality::High, 0.5);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  let decoded_image = decoded.image().unwrap();
  assert_eq!((decoded_image.width(), decoded_image.height()), (1, 24000));
  assert!(!decoded_image.is_texture_backed());
  assert_eq!(decoded.scale_adjustment(), Scale::new(1.0, 0.5));
  cache.draw_with_image_finished(&draw, decoded);
}

#[test]
fn test_negative_scale_uses_magnitude() {
  let cache = build_cache();
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, -0.5);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  let decoded_image = decoded.image().unwrap();
  assert_eq!((decoded_image.width(), decoded_image.height()), (50, 50));
  assert_eq!(decoded.scale_adjustment(), Scale::uniform(0.5));
  assert_eq!(decoded.filter_quality(), FilterQuality::Medium, "high quality is capped");
  cache.draw_with_image_finished(&draw, decoded);
}

#[test]
fn test_empty_draw_decodes_nothing() {
  let cache = build_cache();
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, 0.0);

  let decoded = cache.get_decoded_image_for_draw(&draw);
  assert!(decoded.image().is_none());
  assert!(!decoded.is_at_raster_decode());
  cache.draw_with_image_finished(&draw, decoded);
  assert_eq!(cache.backend().counters.decodes(), 0);
}

#[test]
fn test_failed_image_draws_nothing() {
  let cache = build_cache();
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::Low, 1.0);
  cache.backend().counters.fail_decodes();

  let decoded = cache.get_decoded_image_for_draw(&draw);
  assert!(decoded.image().is_none());
  cache.draw_with_image_finished(&draw, decoded);
  assert_eq!(cache.upload_state(&draw), Some(UploadState::Failed));
  assert_eq!(cache.bytes_used(), 0);
}

#[test]
fn test_mips_generated_only_for_medium_downscale() {
  let cache = build_cache();
  let image = picture(100, 100);

  let medium = draw(&image, FilterQuality::Medium, 0.5);
  let decoded = cache.get_decoded_image_for_draw(&medium);
  assert!(decoded.image().unwrap().texture().unwrap().has_mips);
  cache.draw_with_image_finished(&medium, decoded);

  let other = picture(100, 100);
  let low = draw(&other, FilterQuality::Low, 0.5);
  let decoded = cache.get_decoded_image_for_draw(&low);
  assert!(!decoded.image().unwrap().texture().unwrap().has_mips);
  cache.draw_with_image_finished(&low, decoded);
}

#[test]
fn test_released_textures_wait_for_deletion() {
  let cache = build_cache();
  let image = picture(100, 100);
  let small = draw(&image, FilterQuality::Low, 0.5);
  let large = draw(&image, FilterQuality::Low, 1.0);

  let task = cache.get_task_for_image_and_ref(&small, tracing_info()).task.unwrap();
  process_graph(&task);
  cache.unref_image(&small);

  // Orphaning releases the half-size texture, but a raster may still use it.
  let task = cache.get_task_for_image_and_ref(&large, tracing_info()).task.unwrap();
  assert_eq!(cache.backend().counters.textures_deleted(), 0);

  cache.delete_pending_images();
  assert_eq!(cache.backend().counters.textures_deleted(), 1);

  process_graph(&task);
  cache.unref_image(&large);
}

#[test]
fn test_mip_usage_change_after_canceled_task() {
  let cache = build_cache();
  let image = picture(100, 100);
  let full = draw(&image, FilterQuality::Medium, 1.0);

  // 1. Request at full scale and cancel the whole graph.
  let task = cache.get_task_for_image_and_ref(&full, tracing_info()).task.unwrap();
  for dependency in task.dependencies() {
    cancel_task(dependency);
    complete_task(dependency);
  }
  cancel_task(&task);
  complete_task(&task);
  cache.unref_image(&full);
  assert_eq!(cache.num_cache_entries(), 0);

  // 2. A downscaled draw of the same image now needs mips.
  let scaled = draw(&image, FilterQuality::Medium, 0.6);
  let decoded = cache.get_decoded_image_for_draw(&scaled);
  assert!(decoded.is_at_raster_decode());
  assert!(decoded.image().unwrap().texture().unwrap().has_mips);
  cache.draw_with_image_finished(&scaled, decoded);
  assert_eq!(cache.backend().counters.decodes(), 1);
}

#[test]
fn test_repeated_at_raster_draws_share_one_image() {
  let cache = build_cache_with_limits(0, 0);
  let image = picture(100, 100);
  let draw = draw(&image, FilterQuality::High, 1.0);

  let first = cache.get_decoded_image_for_draw(&draw);
  let second = cache.get_decoded_image_for_draw(&draw);
  assert!(first.is_at_raster_decode() && second.is_at_raster_decode());
  assert_eq!(first.image().unwrap().id(), second.image().unwrap().id());

  cache.draw_with_image_finished(&draw, first);
  cache.draw_with_image_finished(&draw, second);
  let counters = &cache.backend().counters;
  assert_eq!((counters.decodes(), counters.uploads()), (1, 1));
  assert_eq!(cache.bytes_used(), 0);
}

#[test]
fn test_software_image_relocks_without_decoding_again() {
  let cache = build_cache();
  let image = picture(1, 24000);
  let draw = draw(&image, FilterQuality::High, 1.0);

  // 1. Decode into software and keep it locked while referenced.
  let task = cache.get_task_for_image_and_ref(&draw, tracing_info()).task.unwrap();
  process_graph(&task);
  assert!(cache.is_locked(&draw));
  cache.unref_image(&draw);
  assert!(!cache.is_locked(&draw));

  // 2. The next request only has to relock the retained pixels.
  let task = cache.get_task_for_image_and_ref(&draw, tracing_info()).task.unwrap();
  assert_eq!(task.dependencies().len(), 1);
  process_graph(&task);
  assert!(cache.is_locked(&draw));
  cache.unref_image(&draw);

  let counters = &cache.backend().counters;
  assert_eq!(counters.decodes(), 1);
  assert_eq!(counters.locks(), 1);
  assert_eq!(counters.uploads(), 0);
}
