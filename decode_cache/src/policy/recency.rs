use std::hash::Hash;

use ahash::AHashMap;
use generational_arena::{Arena, Index};

#[derive(Debug)]
struct Node<K, V> {
  key: K,
  value: V,
  next: Option<Index>,
  prev: Option<Index>,
}

/// A keyed list ordered by recency of use, backing the persistent cache.
///
/// Head is the most recently used item, tail the least recently used one.
#[derive(Debug)]
pub(crate) struct RecencyList<K: Eq + Hash + Clone, V: Copy> {
  nodes: Arena<Node<K, V>>,
  lookup: AHashMap<K, Index>,
  head: Option<Index>,
  tail: Option<Index>,
}

impl<K: Eq + Hash + Clone, V: Copy> RecencyList<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: AHashMap::new(),
      head: None,
      tail: None,
    }
  }

  // Does not touch the arena or the lookup map.
  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_idx = node.prev;
    let next_idx = node.next;

    if let Some(prev) = prev_idx {
      self.nodes[prev].next = next_idx;
    } else {
      self.head = next_idx;
    }

    if let Some(next) = next_idx {
      self.nodes[next].prev = prev_idx;
    } else {
      self.tail = prev_idx;
    }
  }

  fn push_front_node(&mut self, index: Index) {
    let old_head = self.head;
    self.nodes[index].next = old_head;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head) = old_head {
      self.nodes[old_head].prev = Some(index);
    }

    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.lookup.len()
  }

  #[cfg(test)]
  pub(crate) fn contains(&self, key: &K) -> bool {
    self.lookup.contains_key(key)
  }

  /// Inserts or replaces `key` and makes it the most recently used item.
  /// Returns the replaced value, if any.
  pub(crate) fn push_front(&mut self, key: K, value: V) -> Option<V> {
    if let Some(&index) = self.lookup.get(&key) {
      let old = std::mem::replace(&mut self.nodes[index].value, value);
      self.move_to_front(&key);
      Some(old)
    } else {
      let index = self.nodes.insert(Node {
        key: key.clone(),
        value,
        next: None,
        prev: None,
      });
      self.lookup.insert(key, index);
      self.push_front_node(index);
      None
    }
  }

  pub(crate) fn move_to_front(&mut self, key: &K) {
    if let Some(&index) = self.lookup.get(key) {
      if self.head != Some(index) {
        self.unlink(index);
        self.push_front_node(index);
      }
    }
  }

  /// Looks up `key` and marks it as most recently used.
  pub(crate) fn get(&mut self, key: &K) -> Option<V> {
    let value = self.peek(key)?;
    self.move_to_front(key);
    Some(value)
  }

  /// Looks up `key` without touching recency.
  pub(crate) fn peek(&self, key: &K) -> Option<V> {
    self.lookup.get(key).map(|&index| self.nodes[index].value)
  }

  pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
    let index = self.lookup.remove(key)?;
    self.unlink(index);
    self.nodes.remove(index).map(|node| node.value)
  }

  /// Snapshot of all items, least recently used first.
  pub(crate) fn iter_lru(&self) -> Vec<(K, V)> {
    let mut items = Vec::with_capacity(self.len());
    let mut current = self.tail;
    while let Some(index) = current {
      let node = &self.nodes[index];
      items.push((node.key.clone(), node.value));
      current = node.prev;
    }
    items
  }

  #[cfg(test)]
  pub(crate) fn keys_as_vec(&self) -> Vec<K> {
    let mut keys = Vec::new();
    let mut current = self.head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].next;
    }
    keys
  }
}
