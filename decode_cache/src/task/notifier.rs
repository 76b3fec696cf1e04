use crate::key::CacheKey;
use crate::listener::{EvictionListener, EvictionReason};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use fibre::mpsc;

/// A message sent to the notifier thread.
pub(crate) type Notification = (CacheKey, usize, EvictionReason);

const NOTIFICATION_CHANNEL_CAPACITY: usize = 128;

/// The background thread that calls the user's eviction listener.
pub(crate) struct Notifier {
  handle: Option<JoinHandle<()>>,
  sender: Option<mpsc::BoundedSender<Notification>>,
}

impl Notifier {
  pub(crate) fn spawn(listener: Arc<dyn EvictionListener>) -> Self {
    let (tx, rx): (mpsc::BoundedSender<Notification>, mpsc::BoundedReceiver<Notification>) =
      mpsc::bounded(NOTIFICATION_CHANNEL_CAPACITY);

    // Ends once the sender is dropped.
    let handle = thread::spawn(move || {
      while let Ok((key, bytes, reason)) = rx.recv() {
        listener.on_evict(key, bytes, reason);
      }
    });

    Self {
      handle: Some(handle),
      sender: Some(tx),
    }
  }

  /// Queues a notification. Dropped if the listener is too far behind.
  pub(crate) fn notify(&self, key: CacheKey, bytes: usize, reason: EvictionReason) {
    if let Some(sender) = &self.sender {
      if sender.try_send((key, bytes, reason)).is_err() {
        tracing::trace!(%key, %reason, "eviction notification dropped");
      }
    }
  }
}

impl Drop for Notifier {
  fn drop(&mut self) {
    drop(self.sender.take());
    if let Some(handle) = self.handle.take() {
      // The listener thread may be the one dropping the cache.
      if handle.thread().id() != thread::current().id() {
        let _ = handle.join();
      }
    }
  }
}
