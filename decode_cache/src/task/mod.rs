//! Decode and upload work units handed to the embedder's task runtime.

pub(crate) mod notifier;
pub(crate) mod work;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task#{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
  Decode,
  Upload,
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskKind::Decode => write!(f, "decode"),
      TaskKind::Upload => write!(f, "upload"),
    }
  }
}

/// Lifecycle of a task.
///
/// `New -> Scheduled -> Running -> Finished`, or `Canceled` from `New` or
/// `Scheduled`. Completion is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  New,
  Scheduled,
  Running,
  Finished,
  Canceled,
}

/// Which part of the pipeline requested the work; copied into log spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskCategory {
  #[default]
  Raster,
  Prefetch,
  OutOfRaster,
}

/// Diagnostics carried alongside a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TracingInfo {
  pub prepare_tiles_id: u64,
  pub category: TaskCategory,
}

impl TracingInfo {
  pub fn new(prepare_tiles_id: u64, category: TaskCategory) -> Self {
    Self {
      prepare_tiles_id,
      category,
    }
  }
}

/// Outcome of a task acquisition.
///
/// `need_unref` means the caller now holds a reference and must release it
/// with exactly one `unref_image`. `task`, when present, must be run (or
/// canceled) and completed by the task runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
  pub need_unref: bool,
  pub task: Option<ImageTask>,
}

impl TaskResult {
  /// Nothing to draw or no room to admit the image: no ref, no task.
  pub(crate) fn none() -> Self {
    Self {
      need_unref: false,
      task: None,
    }
  }

  /// Already available; ref taken, no work to schedule.
  pub(crate) fn ready() -> Self {
    Self {
      need_unref: true,
      task: None,
    }
  }

  pub(crate) fn with_task(task: ImageTask) -> Self {
    Self {
      need_unref: true,
      task: Some(task),
    }
  }

  pub fn into_parts(self) -> (bool, Option<ImageTask>) {
    (self.need_unref, self.task)
  }
}

/// The cache side of a task: what to do when it runs and when it completes.
pub(crate) trait TaskWork: Send + Sync {
  fn run(&self);
  fn complete(&self, was_canceled: bool);
}

struct Lifecycle {
  state: TaskState,
  completed: bool,
}

struct TaskInner {
  id: TaskId,
  kind: TaskKind,
  dependencies: Vec<ImageTask>,
  tracing_info: TracingInfo,
  lifecycle: Mutex<Lifecycle>,
  run_finished: Condvar,
  work: Box<dyn TaskWork>,
}

/// A shared handle to one decode or upload work unit.
///
/// Clones refer to the same task; equality is identity. The runtime drives a
/// task through [`schedule`](Self::schedule), [`run`](Self::run) or
/// [`cancel`](Self::cancel), then exactly one effective
/// [`complete`](Self::complete), which hands the outcome back to the cache.
#[derive(Clone)]
pub struct ImageTask {
  inner: Arc<TaskInner>,
}

impl ImageTask {
  pub(crate) fn new(
    kind: TaskKind,
    dependencies: Vec<ImageTask>,
    tracing_info: TracingInfo,
    work: Box<dyn TaskWork>,
  ) -> Self {
    Self {
      inner: Arc::new(TaskInner {
        id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
        kind,
        dependencies,
        tracing_info,
        lifecycle: Mutex::new(Lifecycle {
          state: TaskState::New,
          completed: false,
        }),
        run_finished: Condvar::new(),
        work,
      }),
    }
  }

  pub fn id(&self) -> TaskId {
    self.inner.id
  }

  pub fn kind(&self) -> TaskKind {
    self.inner.kind
  }

  /// Tasks that must finish before this one runs.
  pub fn dependencies(&self) -> &[ImageTask] {
    &self.inner.dependencies
  }

  pub fn tracing_info(&self) -> TracingInfo {
    self.inner.tracing_info
  }

  pub fn state(&self) -> TaskState {
    self.inner.lifecycle.lock().state
  }

  pub fn is_completed(&self) -> bool {
    self.inner.lifecycle.lock().completed
  }

  /// Marks a new task as handed to a runtime.
  pub fn schedule(&self) -> bool {
    let mut lifecycle = self.inner.lifecycle.lock();
    if lifecycle.state == TaskState::New {
      lifecycle.state = TaskState::Scheduled;
      true
    } else {
      false
    }
  }

  /// Executes the work on the calling thread. Returns `false` if the task was
  /// canceled or has already run.
  pub fn run(&self) -> bool {
    {
      let mut lifecycle = self.inner.lifecycle.lock();
      match lifecycle.state {
        TaskState::New | TaskState::Scheduled => lifecycle.state = TaskState::Running,
        _ => return false,
      }
    }

    self.inner.work.run();

    self.inner.lifecycle.lock().state = TaskState::Finished;
    self.inner.run_finished.notify_all();
    true
  }

  /// Blocks while another thread is running this task.
  pub fn wait_while_running(&self) {
    let mut lifecycle = self.inner.lifecycle.lock();
    while lifecycle.state == TaskState::Running {
      self.inner.run_finished.wait(&mut lifecycle);
    }
  }

  /// Cancels a task that has not started running.
  pub fn cancel(&self) -> bool {
    let mut lifecycle = self.inner.lifecycle.lock();
    match lifecycle.state {
      TaskState::New | TaskState::Scheduled => {
        lifecycle.state = TaskState::Canceled;
        true
      }
      _ => false,
    }
  }

  /// Reports the outcome to the cache, releasing the references the task
  /// held. Only the first call has an effect. Completing a task that never
  /// ran counts as a cancellation.
  ///
  /// # Panics
  ///
  /// Panics if the task is still running.
  pub fn complete(&self) {
    let was_canceled = {
      let mut lifecycle = self.inner.lifecycle.lock();
      if lifecycle.completed {
        return;
      }
      assert!(
        lifecycle.state != TaskState::Running,
        "{} completed while still running",
        self.inner.id
      );
      if matches!(lifecycle.state, TaskState::New | TaskState::Scheduled) {
        lifecycle.state = TaskState::Canceled;
      }
      lifecycle.completed = true;
      lifecycle.state == TaskState::Canceled
    };

    self.inner.work.complete(was_canceled);
  }
}

impl PartialEq for ImageTask {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}

impl Eq for ImageTask {}

impl fmt::Debug for ImageTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let lifecycle = self.inner.lifecycle.lock();
    f.debug_struct("ImageTask")
      .field("id", &self.inner.id)
      .field("kind", &self.inner.kind)
      .field("state", &lifecycle.state)
      .field("completed", &lifecycle.completed)
      .field("dependencies", &self.inner.dependencies.len())
      .finish_non_exhaustive()
  }
}
