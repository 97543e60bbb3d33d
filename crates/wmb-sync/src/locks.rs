//! Identifier-scoped async mutual exclusion.
//!
//! Calls touching the same checklist are serialized; calls on different
//! checklists never contend. An entry lives only as long as someone holds or
//! waits on its lock.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async locks keyed by string identifier.
#[derive(Debug, Default)]
pub struct KeyedLocks {
  entries: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

/// Holds one or more identifier locks until dropped.
#[derive(Debug)]
pub struct KeyGuard {
  _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
  pub fn new() -> Self { Self::default() }

  /// Lock a single identifier.
  pub async fn lock(&self, key: &str) -> KeyGuard {
    self.lock_all([key]).await
  }

  /// Lock every identifier in `keys`.
  ///
  /// Keys are deduplicated and acquired in sorted order, so two callers
  /// locking overlapping sets cannot deadlock.
  pub async fn lock_all<I, K>(&self, keys: I) -> KeyGuard
  where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
  {
    let mut keys: Vec<String> =
      keys.into_iter().map(|k| k.as_ref().to_owned()).collect();
    keys.sort_unstable();
    keys.dedup();

    let mutexes = self.resolve(&keys);

    let mut guards = Vec::with_capacity(mutexes.len());
    for mutex in mutexes {
      guards.push(mutex.lock_owned().await);
    }
    KeyGuard { _guards: guards }
  }

  /// Number of identifiers with a live lock.
  pub fn active(&self) -> usize {
    let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries.values().filter(|w| w.strong_count() > 0).count()
  }

  fn resolve(&self, keys: &[String]) -> Vec<Arc<AsyncMutex<()>>> {
    let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    entries.retain(|_, weak| weak.strong_count() > 0);

    keys
      .iter()
      .map(|key| {
        if let Some(existing) = entries.get(key).and_then(Weak::upgrade) {
          return existing;
        }
        let fresh = Arc::new(AsyncMutex::new(()));
        entries.insert(key.clone(), Arc::downgrade(&fresh));
        fresh
      })
      .collect()
  }
}
