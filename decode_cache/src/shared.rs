use crate::backend::{DecodeMode, DecodeTarget, DecodedDrawImage, DecodedImage, ImageBacking, ImageBackend};
use crate::budget::BudgetTracker;
use crate::draw_image::{DrawImage, Picture, PictureId};
use crate::entry::{CacheEntry, LockState, UploadState};
use crate::key::CacheKey;
use crate::listener::EvictionReason;
use crate::memory::MemoryState;
use crate::metrics::Metrics;
use crate::policy::recency::RecencyList;
use crate::runtime::TaskRunner;
use crate::task::notifier::Notifier;
use crate::task::work::{DecodeRole, DecodeWork, UploadWork};
use crate::task::{ImageTask, TaskCategory, TaskKind, TaskResult, TracingInfo};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use generational_arena::{Arena, Index};
use parking_lot::Mutex;
use tracing::{debug, trace, trace_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
  /// Held by callers and by upload or out-of-raster tasks.
  Image,
  /// Pins decoded pixels for pending decode and upload work.
  Decode,
}

/// Per-key reference count. Several keys may share one entry.
#[derive(Debug)]
struct InUseEntry {
  ref_count: u32,
  entry: Index,
}

/// Everything guarded by the cache mutex.
pub(crate) struct CacheState<B: ImageBackend> {
  entries: Arena<CacheEntry<B>>,
  /// At most one entry per picture, in recency order.
  persistent: RecencyList<PictureId, Index>,
  in_use: AHashMap<CacheKey, InUseEntry>,
  budget: BudgetTracker,
  /// Textures released while a raster may still be using them.
  pending_deletion: Vec<DecodedImage<B>>,
}

/// The shared core of an [`ImageDecodeCache`](crate::ImageDecodeCache).
pub(crate) struct CacheShared<B: ImageBackend> {
  pub(crate) backend: B,
  pub(crate) state: Mutex<CacheState<B>>,
  pub(crate) metrics: Metrics,
  pub(crate) notifier: Option<Notifier>,
  pub(crate) task_runner: Option<Arc<dyn TaskRunner>>,
  pub(crate) bytes_per_pixel: usize,
  pub(crate) max_texture_size: u32,
  next_image_id: AtomicU64,
}

impl<B: ImageBackend> CacheShared<B> {
  pub(crate) fn new(
    backend: B,
    budget: BudgetTracker,
    notifier: Option<Notifier>,
    task_runner: Option<Arc<dyn TaskRunner>>,
    bytes_per_pixel: usize,
    max_texture_size: u32,
  ) -> Self {
    Self {
      backend,
      state: Mutex::new(CacheState {
        entries: Arena::new(),
        persistent: RecencyList::new(),
        in_use: AHashMap::new(),
        budget,
        pending_deletion: Vec::new(),
      }),
      metrics: Metrics::new(),
      notifier,
      task_runner,
      bytes_per_pixel,
      max_texture_size,
      next_image_id: AtomicU64::new(1),
    }
  }

  fn next_image_id(&self) -> u64 {
    self.next_image_id.fetch_add(1, Ordering::Relaxed)
  }

  /// Decode parameters and byte size of an entry for `key`.
  pub(crate) fn decode_target(&self, picture: &B::Picture, key: &CacheKey) -> (DecodeTarget, usize) {
    let (width, height) = key.bucketed_scale.size_of(picture.width(), picture.height());
    let mode = if width > self.max_texture_size || height > self.max_texture_size {
      DecodeMode::Software
    } else {
      DecodeMode::Gpu
    };
    let size = (width as usize)
      .saturating_mul(height as usize)
      .saturating_mul(self.bytes_per_pixel);
    let target = DecodeTarget {
      mip_level: key.bucketed_scale,
      width,
      height,
      color_space: key.color_space,
      quality: key.quality_tier,
      mode,
      generate_mips: key.mip_required && mode == DecodeMode::Gpu,
    };
    (target, size)
  }

  // --- Acquisition ---

  pub(crate) fn get_task_and_ref(
    self: &Arc<Self>,
    draw: &DrawImage<B::Picture>,
    tracing_info: TracingInfo,
    role: DecodeRole,
  ) -> TaskResult {
    if draw.is_empty_draw() {
      return TaskResult::none();
    }
    let key = CacheKey::for_draw(draw);

    let mut guard = self.state.lock();
    let state = &mut *guard;

    let mut existing = self.find_entry(state, &key);
    if let Some(index) = existing {
      let entry = &state.entries[index];
      if entry.is_at_raster || entry.failed {
        return TaskResult::none();
      }
      let uploaded = entry.upload.image.is_some();
      let locked = entry.is_locked();
      let in_flight = match role {
        DecodeRole::Upload => entry.upload.task.clone(),
        DecodeRole::OutOfRaster => entry.decode.out_of_raster_task.clone(),
      };

      if uploaded {
        self.add_ref(state, &key, index, RefKind::Image);
        Metrics::bump(&self.metrics.upload_hits);
        return TaskResult::ready();
      }
      if let Some(task) = in_flight {
        self.add_ref(state, &key, index, RefKind::Image);
        Metrics::bump(&self.metrics.tasks_coalesced);
        return TaskResult::with_task(task);
      }
      if role == DecodeRole::OutOfRaster && locked {
        // Already decoded; nothing left to warm.
        self.add_ref(state, &key, index, RefKind::Image);
        return TaskResult::ready();
      }
    }

    let (target, size) = self.decode_target(draw.picture(), &key);
    let required = match existing {
      Some(index) if state.entries[index].upload.budgeted => 0,
      _ => size,
    };
    if !self.ensure_capacity(state, required) {
      Metrics::bump(&self.metrics.admissions_rejected);
      debug!(
        %key,
        required,
        bytes_used = state.budget.bytes_used(),
        "no room for image; it will be decoded at raster"
      );
      return TaskResult::none();
    }

    // Capacity eviction may have dropped an idle entry we found.
    existing = existing.filter(|&index| state.entries.contains(index));
    let index = match existing {
      Some(index) => index,
      None => {
        let entry = CacheEntry::new(key, draw.picture().clone(), target, size);
        let index = state.entries.insert(entry);
        self.insert_persistent(state, index);
        index
      }
    };

    // Held by the task until it completes.
    self.add_ref(state, &key, index, RefKind::Image);
    let task = match role {
      DecodeRole::Upload => {
        let dependency = self.upload_dependency_and_ref(state, &key, index, tracing_info);
        let upload = ImageTask::new(
          TaskKind::Upload,
          dependency.into_iter().collect(),
          tracing_info,
          Box::new(UploadWork::new(Arc::downgrade(self), key, index, tracing_info)),
        );
        state.entries[index].upload.task = Some(upload.clone());
        upload
      }
      DecodeRole::OutOfRaster => self.new_decode_task(state, &key, index, role, tracing_info),
    };
    // Held by the caller until `unref_image`.
    self.add_ref(state, &key, index, RefKind::Image);
    Metrics::bump(&self.metrics.tasks_created);
    trace!(%key, task = %task.id(), kind = %task.kind(), "created image task");

    TaskResult::with_task(task)
  }

  /// Takes the upload task's decode ref and returns the decode task it must
  /// wait for, if the pixels are not locked yet.
  fn upload_dependency_and_ref(
    self: &Arc<Self>,
    state: &mut CacheState<B>,
    key: &CacheKey,
    index: Index,
    tracing_info: TracingInfo,
  ) -> Option<ImageTask> {
    self.add_ref(state, key, index, RefKind::Decode);
    let entry = &state.entries[index];
    if entry.is_locked() {
      return None;
    }
    if let Some(existing) = &entry.decode.task {
      return Some(existing.clone());
    }
    Some(self.new_decode_task(state, key, index, DecodeRole::Upload, tracing_info))
  }

  /// Creates a decode task holding its own decode ref.
  fn new_decode_task(
    self: &Arc<Self>,
    state: &mut CacheState<B>,
    key: &CacheKey,
    index: Index,
    role: DecodeRole,
    tracing_info: TracingInfo,
  ) -> ImageTask {
    self.add_ref(state, key, index, RefKind::Decode);
    let task = ImageTask::new(
      TaskKind::Decode,
      Vec::new(),
      tracing_info,
      Box::new(DecodeWork::new(Arc::downgrade(self), *key, index, role, tracing_info)),
    );
    let decode = &mut state.entries[index].decode;
    match role {
      DecodeRole::Upload => decode.task = Some(task.clone()),
      DecodeRole::OutOfRaster => decode.out_of_raster_task = Some(task.clone()),
    }
    task
  }

  pub(crate) fn unref_image(&self, draw: &DrawImage<B::Picture>) {
    let key = CacheKey::for_draw(draw);
    let mut guard = self.state.lock();
    self.remove_ref(&mut guard, &key, RefKind::Image);
  }

  // --- Task callbacks ---

  pub(crate) fn decode_task_completed(&self, key: &CacheKey, index: Index, role: DecodeRole, was_canceled: bool) {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    if was_canceled {
      Metrics::bump(&self.metrics.tasks_canceled);
    }
    if let Some(entry) = state.entries.get_mut(index) {
      match role {
        DecodeRole::Upload => entry.decode.task = None,
        DecodeRole::OutOfRaster => entry.decode.out_of_raster_task = None,
      }
    }
    self.remove_ref(state, key, RefKind::Decode);
    if role == DecodeRole::OutOfRaster {
      self.remove_ref(state, key, RefKind::Image);
    }
  }

  pub(crate) fn upload_task_completed(&self, key: &CacheKey, index: Index, was_canceled: bool) {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    if was_canceled {
      Metrics::bump(&self.metrics.tasks_canceled);
    }
    if let Some(entry) = state.entries.get_mut(index) {
      entry.upload.task = None;
    }
    self.remove_ref(state, key, RefKind::Decode);
    self.remove_ref(state, key, RefKind::Image);
  }

  // --- Work, run without holding the lock across backend calls ---

  pub(crate) fn decode_image(&self, index: Index, tracing_info: TracingInfo) {
    let (picture, target) = {
      let mut guard = self.state.lock();
      let Some(entry) = guard.entries.get_mut(index) else {
        return;
      };
      if entry.failed || entry.is_locked() {
        return;
      }
      if entry.mode() == DecodeMode::Gpu && entry.upload.image.is_some() {
        return;
      }
      if let Some(pixels) = &entry.decode.pixels {
        if self.backend.lock_pixels(pixels) {
          entry.decode.lock_state = LockState::Locked;
          Metrics::bump(&self.metrics.relocks);
          return;
        }
        // Purged by the backing store.
        entry.decode.pixels = None;
      }
      entry.decode.in_progress = true;
      (entry.picture.clone(), entry.target.clone())
    };

    let result = {
      let _span = trace_span!(
        "image_decode",
        picture = %picture.id(),
        mip = %target.mip_level,
        prepare_tiles_id = tracing_info.prepare_tiles_id,
        category = ?tracing_info.category,
      )
      .entered();
      self.backend.decode(&picture, &target)
    };

    let mut guard = self.state.lock();
    let Some(entry) = guard.entries.get_mut(index) else {
      return;
    };
    entry.decode.in_progress = false;
    match result {
      Ok(pixels) => {
        if entry.decode.pixels.is_some() {
          // Another thread got there first.
          self.backend.unlock_pixels(&pixels);
          return;
        }
        entry.decode.pixels = Some(Arc::new(pixels));
        entry.decode.lock_state = LockState::Locked;
        Metrics::bump(&self.metrics.decodes);
      }
      Err(err) => {
        warn!(key = %entry.key, error = %err, "image decode failed");
        entry.failed = true;
        Metrics::bump(&self.metrics.failures);
      }
    }
  }

  pub(crate) fn upload_image(&self, index: Index, tracing_info: TracingInfo) {
    let (pixels, target) = {
      let mut guard = self.state.lock();
      let Some(entry) = guard.entries.get_mut(index) else {
        return;
      };
      if entry.failed || entry.upload.image.is_some() || !entry.is_locked() {
        return;
      }
      let Some(pixels) = entry.decode.pixels.clone() else {
        return;
      };
      if entry.mode() == DecodeMode::Software {
        let id = self.next_image_id();
        let (width, height) = (entry.target.width, entry.target.height);
        entry.upload.image = Some(DecodedImage::new(id, width, height, ImageBacking::Software(pixels)));
        return;
      }
      entry.upload.in_progress = true;
      (pixels, entry.target.clone())
    };

    let result = {
      let _span = trace_span!(
        "image_upload",
        mip = %target.mip_level,
        width = target.width,
        height = target.height,
        prepare_tiles_id = tracing_info.prepare_tiles_id,
        category = ?tracing_info.category,
      )
      .entered();
      self.backend.upload(&pixels, &target)
    };

    let mut guard = self.state.lock();
    let state = &mut *guard;
    let Some(entry) = state.entries.get_mut(index) else {
      return;
    };
    entry.upload.in_progress = false;
    match result {
      Ok(texture) => {
        let image = DecodedImage::new(
          self.next_image_id(),
          target.width,
          target.height,
          ImageBacking::Texture(Arc::new(texture)),
        );
        if entry.upload.image.is_some() {
          state.pending_deletion.push(image);
          return;
        }
        entry.upload.image = Some(image);
        Metrics::bump(&self.metrics.uploads);
      }
      Err(err) => {
        warn!(key = %entry.key, error = %err, "image upload failed");
        entry.failed = true;
        Metrics::bump(&self.metrics.failures);
      }
    }
  }

  // --- At-raster ---

  pub(crate) fn get_decoded_image_for_draw(&self, draw: &DrawImage<B::Picture>) -> DecodedDrawImage<B> {
    if draw.is_empty_draw() {
      return DecodedDrawImage::empty(draw.quality());
    }
    let key = CacheKey::for_draw(draw);

    let index = {
      let mut guard = self.state.lock();
      let state = &mut *guard;
      let index = match self.find_entry(state, &key) {
        Some(index) => index,
        None => {
          let (target, size) = self.decode_target(draw.picture(), &key);
          let index = state.entries.insert(CacheEntry::new(key, draw.picture().clone(), target, size));
          self.insert_persistent(state, index);
          index
        }
      };
      let entry = &mut state.entries[index];
      if !entry.upload.budgeted {
        entry.is_at_raster = true;
      }
      self.add_ref(state, &key, index, RefKind::Image);
      self.add_ref(state, &key, index, RefKind::Decode);
      index
    };

    let tracing_info = TracingInfo::new(0, TaskCategory::Raster);
    self.decode_image(index, tracing_info);
    self.upload_image(index, tracing_info);

    let mut guard = self.state.lock();
    let state = &mut *guard;
    self.remove_ref(state, &key, RefKind::Decode);

    let entry = &state.entries[index];
    if entry.is_at_raster {
      Metrics::bump(&self.metrics.at_raster_draws);
    }
    let picture = draw.picture();
    DecodedDrawImage::new(
      entry.upload.image.clone(),
      entry.target.mip_level.scale_adjustment(picture.width(), picture.height()),
      key.quality_tier.filter_quality(),
      entry.is_at_raster,
    )
  }

  /// Releases the draw's reference and returns textures that are now safe to
  /// delete.
  pub(crate) fn draw_with_image_finished(&self, draw: &DrawImage<B::Picture>) -> Vec<DecodedImage<B>> {
    if draw.is_empty_draw() {
      return Vec::new();
    }
    let key = CacheKey::for_draw(draw);
    let mut guard = self.state.lock();
    self.remove_ref(&mut guard, &key, RefKind::Image);
    std::mem::take(&mut guard.pending_deletion)
  }

  // --- Memory management ---

  pub(crate) fn take_pending_deletion(&self) -> Vec<DecodedImage<B>> {
    std::mem::take(&mut self.state.lock().pending_deletion)
  }

  pub(crate) fn clear(&self) -> Vec<DecodedImage<B>> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    let mut removed = 0usize;
    for (picture_id, index) in state.persistent.iter_lru() {
      if state.entries[index].has_any_refs() {
        continue;
      }
      self.release_image(state, index, Some(EvictionReason::Cleared));
      state.persistent.remove(&picture_id);
      state.entries.remove(index);
      removed += 1;
    }
    debug!(removed, bytes_used = state.budget.bytes_used(), "image cache cleared");
    std::mem::take(&mut state.pending_deletion)
  }

  pub(crate) fn set_aggressively_free(&self, aggressively_free: bool) -> Vec<DecodedImage<B>> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    state.budget.set_aggressively_free(aggressively_free);
    debug!(aggressively_free, "image cache aggressive free toggled");
    if aggressively_free {
      self.ensure_capacity(state, 0);
    }
    std::mem::take(&mut state.pending_deletion)
  }

  pub(crate) fn set_memory_state(&self, memory_state: MemoryState) -> Vec<DecodedImage<B>> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    let previous = state.budget.memory_state();
    state.budget.set_memory_state(memory_state);
    debug!(from = %previous, to = %memory_state, "image cache memory state changed");
    self.ensure_capacity(state, 0);
    std::mem::take(&mut state.pending_deletion)
  }

  pub(crate) fn purge(&self) -> Vec<DecodedImage<B>> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    let previous = state.budget.memory_state();
    state.budget.set_memory_state(MemoryState::Suspended);
    self.ensure_capacity(state, 0);
    state.budget.set_memory_state(previous);
    debug!(
      entries = state.persistent.len(),
      bytes_used = state.budget.bytes_used(),
      "image cache purged"
    );
    std::mem::take(&mut state.pending_deletion)
  }

  pub(crate) fn memory_state(&self) -> MemoryState {
    self.state.lock().budget.memory_state()
  }

  pub(crate) fn set_byte_limits(&self, working_set: usize, persistent: usize) {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    state.budget.set_limits(working_set, persistent);
    self.ensure_capacity(state, 0);
  }

  pub(crate) fn usage(&self) -> (usize, usize) {
    let state = self.state.lock();
    (state.budget.bytes_used(), state.persistent.len())
  }

  // --- Introspection ---

  pub(crate) fn with_entry<R>(
    &self,
    draw: &DrawImage<B::Picture>,
    f: impl FnOnce(&mut CacheEntry<B>) -> R,
  ) -> Option<R> {
    let key = CacheKey::for_draw(draw);
    let mut guard = self.state.lock();
    let state = &mut *guard;
    let index = Self::peek_entry(state, &key)?;
    state.entries.get_mut(index).map(f)
  }

  pub(crate) fn is_in_use(&self, draw: &DrawImage<B::Picture>) -> bool {
    let key = CacheKey::for_draw(draw);
    self.state.lock().in_use.contains_key(&key)
  }

  pub(crate) fn upload_state(&self, draw: &DrawImage<B::Picture>) -> Option<UploadState> {
    self.with_entry(draw, |entry| entry.upload_state())
  }

  // --- Internal bookkeeping, all under the lock ---

  /// Lookup without side effects.
  fn peek_entry(state: &CacheState<B>, key: &CacheKey) -> Option<Index> {
    if let Some(in_use) = state.in_use.get(key) {
      return Some(in_use.entry);
    }
    let index = state.persistent.peek(&key.picture_id)?;
    state.entries[index].key.can_serve(key).then_some(index)
  }

  /// Finds an entry able to serve `key`. A persistent entry for the same
  /// picture that cannot serve it is orphaned.
  fn find_entry(&self, state: &mut CacheState<B>, key: &CacheKey) -> Option<Index> {
    if let Some(in_use) = state.in_use.get(key) {
      return Some(in_use.entry);
    }
    let index = state.persistent.get(&key.picture_id)?;
    if state.entries[index].key.can_serve(key) {
      return Some(index);
    }
    self.orphan(state, index, key);
    None
  }

  fn orphan(&self, state: &mut CacheState<B>, index: Index, replacement: &CacheKey) {
    let entry = &mut state.entries[index];
    debug!(old = %entry.key, new = %replacement, refs = entry.upload.ref_count, "image cache entry orphaned");
    entry.is_orphaned = true;
    entry.in_persistent = false;
    if state.persistent.peek(&entry.key.picture_id) == Some(index) {
      state.persistent.remove(&entry.key.picture_id);
    }
    Metrics::bump(&self.metrics.orphaned);
    self.ownership_changed(state, index);
  }

  fn insert_persistent(&self, state: &mut CacheState<B>, index: Index) {
    let entry = &mut state.entries[index];
    let key = entry.key;
    entry.in_persistent = true;
    if let Some(previous) = state.persistent.push_front(key.picture_id, index) {
      if previous != index {
        self.orphan(state, previous, &key);
      }
    }
  }

  fn add_ref(&self, state: &mut CacheState<B>, key: &CacheKey, index: Index, kind: RefKind) {
    let in_use = state.in_use.entry(*key).or_insert(InUseEntry {
      ref_count: 0,
      entry: index,
    });
    debug_assert_eq!(in_use.entry, index, "in-use key {key} maps to another entry");
    in_use.ref_count += 1;

    let entry = &mut state.entries[index];
    match kind {
      RefKind::Image => entry.upload.ref_count += 1,
      RefKind::Decode => entry.decode.ref_count += 1,
    }
    trace!(%key, ?kind, refs = entry.upload.ref_count, decode_refs = entry.decode.ref_count, "ref");
    self.ownership_changed(state, index);
  }

  fn remove_ref(&self, state: &mut CacheState<B>, key: &CacheKey, kind: RefKind) {
    let Some(in_use) = state.in_use.get_mut(key) else {
      panic!("unref of {key} without a matching ref");
    };
    assert!(in_use.ref_count > 0, "in-use ref count underflow for {key}");
    in_use.ref_count -= 1;
    let index = in_use.entry;
    if in_use.ref_count == 0 {
      state.in_use.remove(key);
    }

    let entry = &mut state.entries[index];
    let count = match kind {
      RefKind::Image => &mut entry.upload.ref_count,
      RefKind::Decode => &mut entry.decode.ref_count,
    };
    assert!(*count > 0, "{kind:?} ref count underflow for {key}");
    *count -= 1;
    trace!(%key, ?kind, refs = entry.upload.ref_count, decode_refs = entry.decode.ref_count, "unref");
    self.ownership_changed(state, index);
  }

  /// Drops the entry's uploaded image, adjusting the budget. Textures are
  /// queued for deletion; software images just drop their pixel handle.
  fn release_image(&self, state: &mut CacheState<B>, index: Index, reason: Option<EvictionReason>) {
    let entry = &mut state.entries[index];
    let Some(image) = entry.upload.image.take() else {
      return;
    };
    if entry.upload.budgeted {
      state.budget.release(entry.size);
      entry.upload.budgeted = false;
    }
    if image.is_texture_backed() {
      state.pending_deletion.push(image);
    }

    let Some(reason) = reason else {
      return;
    };
    match reason {
      EvictionReason::Capacity => Metrics::bump(&self.metrics.evicted_by_capacity),
      EvictionReason::Cleared => Metrics::bump(&self.metrics.cleared),
      EvictionReason::Orphaned => {}
    }
    trace!(key = %entry.key, bytes = entry.size, %reason, "image evicted");
    if let Some(notifier) = &self.notifier {
      notifier.notify(entry.key, entry.size, reason);
    }
  }

  /// Re-evaluates budget, lock state and lifetime of an entry after its refs
  /// or its membership in the persistent cache changed.
  fn ownership_changed(&self, state: &mut CacheState<B>, index: Index) {
    let entry = &state.entries[index];
    let has_any_refs = entry.has_any_refs();

    // Both tasks were canceled before producing anything.
    if !has_any_refs
      && entry.in_persistent
      && !entry.failed
      && entry.upload.image.is_none()
      && entry.decode.pixels.is_none()
    {
      let picture_id = entry.key.picture_id;
      if state.persistent.peek(&picture_id) == Some(index) {
        state.persistent.remove(&picture_id);
      }
      state.entries[index].in_persistent = false;
    }

    let entry = &state.entries[index];
    if !has_any_refs {
      if entry.is_orphaned {
        self.release_image(state, index, Some(EvictionReason::Orphaned));
      } else if entry.mode() == DecodeMode::Software {
        // Software images wrap the locked pixels.
        self.release_image(state, index, None);
      }
    }

    let entry = &state.entries[index];
    if entry.is_at_raster && !has_any_refs {
      let fits = state.budget.can_fit_in_cache(entry.size) && state.budget.can_fit_in_working_set(entry.size);
      if entry.upload.image.is_some() && !fits {
        self.release_image(state, index, None);
      }
      let entry = &mut state.entries[index];
      entry.is_at_raster = false;
      if entry.upload.image.is_some() {
        state.budget.charge(entry.size);
        entry.upload.budgeted = true;
        trace!(key = %entry.key, "at-raster image admitted to the cache");
      }
    }

    let entry = &mut state.entries[index];
    if entry.upload.ref_count > 0 && !entry.upload.budgeted && !entry.is_at_raster {
      state.budget.charge(entry.size);
      entry.upload.budgeted = true;
    }
    if entry.upload.ref_count == 0 && entry.upload.budgeted && entry.upload.image.is_none() {
      state.budget.release(entry.size);
      entry.upload.budgeted = false;
    }

    let should_unlock = !has_any_refs
      || (entry.mode() == DecodeMode::Gpu && entry.decode.ref_count == 0 && entry.upload.image.is_some());
    if should_unlock && entry.is_locked() {
      if let Some(pixels) = &entry.decode.pixels {
        self.backend.unlock_pixels(pixels);
      }
      entry.decode.lock_state = LockState::Unlocked;
    }

    if !has_any_refs && !entry.in_persistent {
      self.release_image(state, index, None);
      if let Some(entry) = state.entries.remove(index) {
        trace!(key = %entry.key, "image cache entry destroyed");
      }
    }

    self.ensure_capacity(state, 0);
  }

  fn within_item_limit(state: &CacheState<B>) -> bool {
    !state.budget.exceeds_preferred_count(state.persistent.len())
  }

  fn has_room(state: &CacheState<B>, required: usize) -> bool {
    state.budget.can_fit_in_working_set(required)
      && state.budget.can_fit_in_cache(required)
      && Self::within_item_limit(state)
  }

  /// Frees idle entries, least recently used first, until `required` more
  /// bytes fit both limits and the entry count is within the preferred
  /// count. Admission then only needs the working set to hold `required`.
  fn ensure_capacity(&self, state: &mut CacheState<B>, required: usize) -> bool {
    if Self::has_room(state, required) {
      return true;
    }

    for (picture_id, index) in state.persistent.iter_lru() {
      let entry = &state.entries[index];
      if entry.has_any_refs() {
        continue;
      }
      debug_assert!(!entry.is_locked(), "idle entry {} is still locked", entry.key);

      self.release_image(state, index, Some(EvictionReason::Capacity));
      if !Self::within_item_limit(state) {
        state.persistent.remove(&picture_id);
        state.entries.remove(index);
      }

      if Self::has_room(state, required) {
        return true;
      }
    }

    state.budget.can_fit_in_working_set(required)
  }
}
