use crate::task::ImageTask;

/// Executes image task graphs on behalf of the embedder.
pub trait TaskRunner: Send + Sync + 'static {
  /// Submits a task. Its dependencies must finish before it runs, and every
  /// task in the graph must eventually be completed.
  fn schedule(&self, task: ImageTask);

  /// Cancels a task and any of its dependencies that have not started, then
  /// completes them so their references are released.
  fn cancel(&self, task: &ImageTask) {
    cancel_task_graph(task);
  }
}

/// Runs `task` on the calling thread after its dependencies, completing each.
///
/// Coalesced requests share tasks, so several threads may walk the same
/// graph. A task another thread is running is waited for, never skipped.
pub fn run_task_graph(task: &ImageTask) {
  for dependency in task.dependencies() {
    if !dependency.is_completed() {
      run_task_graph(dependency);
    }
  }

  task.schedule();
  task.run();
  task.wait_while_running();
  task.complete();
}

/// Cancels every not-yet-started task in the graph and completes it.
pub fn cancel_task_graph(task: &ImageTask) {
  if task.cancel() {
    for dependency in task.dependencies() {
      cancel_task_graph(dependency);
    }
    task.complete();
  }
}

/// Runs every scheduled graph synchronously on the scheduling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineTaskRunner;

impl TaskRunner for InlineTaskRunner {
  fn schedule(&self, task: ImageTask) {
    run_task_graph(&task);
  }
}

/// Runs task graphs on Tokio's blocking pool, since decodes are CPU bound.
#[cfg(feature = "tokio")]
pub struct TokioTaskRunner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioTaskRunner {
  /// Creates a runner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl TaskRunner for TokioTaskRunner {
  fn schedule(&self, task: ImageTask) {
    // Already handed to a runner by another caller.
    if !task.schedule() {
      return;
    }
    self.0.spawn_blocking(move || run_task_graph(&task));
  }
}
