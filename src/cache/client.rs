//! The query cache: one explicitly owned store shared by every view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::config::QueryConfig;
use super::entry::{
  CacheStats, EntryState, ErasedFetcher, QueryEntry, QuerySnapshot, RestoreOutcome,
};
use super::key::QueryKey;

#[derive(Default)]
pub(crate) struct Cache {
  pub entries: HashMap<QueryKey, QueryEntry>,
  pub next_fetch_id: u64,
}

impl Cache {
  pub fn entry_mut(&mut self, key: &QueryKey) -> &mut QueryEntry {
    self
      .entries
      .entry(key.clone())
      .or_insert_with(QueryEntry::new)
  }

  pub fn next_id(&mut self) -> u64 {
    self.next_fetch_id += 1;
    self.next_fetch_id
  }

  fn matching_keys(&self, prefix: &QueryKey) -> Vec<QueryKey> {
    self
      .entries
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect()
  }
}

/// Handle to the query cache.
///
/// Cloning is cheap and every clone sees the same entries. The application
/// creates one at start-up, hands clones to its views, and calls
/// [`QueryClient::clear`] on shutdown.
///
/// Every operation takes the lock, changes state, notifies observers and
/// releases the lock before returning, so writes are visible to all readers
/// immediately.
#[derive(Clone, Default)]
pub struct QueryClient {
  inner: Arc<Mutex<Cache>>,
  config: QueryConfig,
}

impl QueryClient {
  pub fn new(config: QueryConfig) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Cache::default())),
      config,
    }
  }

  pub fn config(&self) -> &QueryConfig {
    &self.config
  }

  /// Cache state stays consistent across a panicking holder since every
  /// critical section is a handful of field assignments.
  pub(crate) fn lock(&self) -> MutexGuard<'_, Cache> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read cached data without touching the network.
  ///
  /// Returns `None` when nothing is cached or the cached value is not a `T`.
  pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<T>
  where
    T: Clone + Send + Sync + 'static,
  {
    let mut cache = self.lock();
    let entry = cache.entries.get_mut(key)?;
    entry.last_accessed = Instant::now();
    entry.data.as_ref()?.downcast_ref::<T>().cloned()
  }

  pub fn get_query_state(&self, key: &QueryKey) -> Option<EntryState> {
    self.lock().entries.get(key).map(QueryEntry::state)
  }

  /// Data exists but is older than `stale_time` or was invalidated.
  pub fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
    let cache = self.lock();
    match cache.entries.get(key) {
      Some(entry) if entry.data.is_some() => !entry.is_fresh(stale_time, Instant::now()),
      _ => false,
    }
  }

  /// Data and metadata under a single lock, for observers.
  pub(crate) fn read<T>(&self, key: &QueryKey) -> Option<(Option<T>, EntryState)>
  where
    T: Clone + Send + Sync + 'static,
  {
    let mut cache = self.lock();
    let entry = cache.entries.get_mut(key)?;
    entry.last_accessed = Instant::now();
    let data = entry
      .data
      .as_ref()
      .and_then(|d| d.downcast_ref::<T>())
      .cloned();
    Some((data, entry.state()))
  }

  /// Replace the data for `key` with `updater(current)`.
  ///
  /// `current` is `None` when nothing (or something of another type) is
  /// cached; the updater then supplies the initial value. The entry becomes
  /// a fresh success. Any in-flight fetch is left alone.
  pub fn set_query_data<T, F>(&self, key: &QueryKey, updater: F)
  where
    T: Send + Sync + 'static,
    F: FnOnce(Option<&T>) -> T,
  {
    let mut cache = self.lock();
    let entry = cache.entry_mut(key);
    let next = updater(entry.data.as_ref().and_then(|d| d.downcast_ref::<T>()));
    entry.store_success(Arc::new(next));
    entry.last_accessed = Instant::now();
    entry.notify();
    debug!(%key, version = entry.version, "query data written");
  }

  /// Mark `key` stale. If anyone is observing it, refetch in the background.
  pub fn invalidate(&self, key: &QueryKey) {
    let mut cache = self.lock();
    if cache.entries.contains_key(key) {
      self.invalidate_locked(&mut cache, key);
    }
  }

  /// Invalidate `prefix` and every key that starts with it.
  pub fn invalidate_prefix(&self, prefix: &QueryKey) {
    let mut cache = self.lock();
    for key in cache.matching_keys(prefix) {
      self.invalidate_locked(&mut cache, &key);
    }
  }

  fn invalidate_locked(&self, cache: &mut Cache, key: &QueryKey) {
    let id = cache.next_id();
    let entry = cache.entry_mut(key);
    entry.invalidated = true;

    match entry.in_flight.as_ref().map(|f| f.after_invalidation) {
      Some(false) => {
        // The running fetch may have been issued before whatever caused
        // this invalidation; one more fetch follows it
        entry.refetch_pending = true;
        debug!(%key, "invalidated during fetch, refetch queued");
      }
      Some(true) => debug!(%key, "invalidated, fetch already under way"),
      None => match entry.fetcher.clone() {
        Some(fetcher) if entry.observer_count() > 0 => {
          debug!(%key, "invalidated, refetching for active observers");
          let _pending = self.start_fetch(entry, key, id, &fetcher);
        }
        _ => debug!(%key, "invalidated"),
      },
    }
    entry.notify();
  }

  /// Stop the in-flight fetch for `key` from ever landing in the cache.
  ///
  /// Cached data is kept. Returns false if nothing was in flight.
  pub fn cancel(&self, key: &QueryKey) -> bool {
    let mut cache = self.lock();
    let Some(entry) = cache.entries.get_mut(key) else {
      return false;
    };
    let cancelled = entry.cancel_fetch();
    if cancelled {
      debug!(%key, "fetch cancelled");
      entry.notify();
    }
    cancelled
  }

  /// Snapshot `key`, then apply `updater` as [`set_query_data`] does.
  ///
  /// The snapshot remembers the version produced by this write, so a later
  /// [`restore`] can tell whether someone else wrote in between.
  ///
  /// [`set_query_data`]: QueryClient::set_query_data
  /// [`restore`]: QueryClient::restore
  pub fn optimistic_update<T, F>(&self, key: &QueryKey, updater: F) -> QuerySnapshot
  where
    T: Send + Sync + 'static,
    F: FnOnce(Option<&T>) -> T,
  {
    let mut cache = self.lock();
    let entry = cache.entry_mut(key);
    let mut snapshot = QuerySnapshot::capture(key, entry);

    let next = updater(entry.data.as_ref().and_then(|d| d.downcast_ref::<T>()));
    entry.store_success(Arc::new(next));
    entry.last_accessed = Instant::now();
    entry.notify();

    snapshot.expected_version = entry.version;
    debug!(%key, version = entry.version, "optimistic update applied");
    snapshot
  }

  /// Put a snapshot back exactly as captured.
  pub fn restore(&self, snapshot: QuerySnapshot) -> RestoreOutcome {
    let mut cache = self.lock();
    let entry = cache.entry_mut(&snapshot.key);

    let outcome = if entry.version == snapshot.expected_version {
      RestoreOutcome::Clean
    } else {
      RestoreOutcome::Interleaved
    };

    entry.data = snapshot.data;
    entry.data_updated_at = snapshot.data_updated_at;
    entry.updated_at = snapshot.updated_at;
    entry.status = snapshot.status;
    entry.error = snapshot.error;
    entry.invalidated = snapshot.invalidated;
    entry.version += 1;
    entry.notify();

    debug!(key = %snapshot.key, ?outcome, "snapshot restored");
    outcome
  }

  /// Register as an observer of `key`. The receiver ticks on every change;
  /// dropping it unregisters.
  pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<u64> {
    let mut cache = self.lock();
    cache.entry_mut(key).subscribe()
  }

  /// Subscribe and record the fetcher used for background refetches.
  pub(crate) fn observe(&self, key: &QueryKey, fetcher: ErasedFetcher) -> watch::Receiver<u64> {
    let mut cache = self.lock();
    let entry = cache.entry_mut(key);
    entry.fetcher = Some(fetcher);
    entry.subscribe()
  }

  /// Drop entries nobody observes, fetches or touched within `gc_time`.
  pub fn collect_garbage(&self) -> usize {
    let gc_time = self.config.gc_time;
    let now = Instant::now();
    let mut cache = self.lock();
    let before = cache.entries.len();
    cache.entries.retain(|_, entry| {
      entry.observer_count() > 0
        || entry.is_fetching()
        || now.saturating_duration_since(entry.last_accessed) < gc_time
    });
    let evicted = before - cache.entries.len();
    if evicted > 0 {
      debug!(evicted, "garbage collected query entries");
    }
    evicted
  }

  /// Cancel every fetch and drop every entry.
  pub fn clear(&self) {
    let mut cache = self.lock();
    for entry in cache.entries.values_mut() {
      entry.cancel_fetch();
    }
    cache.entries.clear();
  }

  pub fn stats(&self) -> CacheStats {
    let cache = self.lock();
    cache
      .entries
      .values()
      .fold(CacheStats::default(), |mut stats, entry| {
        stats.entries += 1;
        stats.observers += entry.observer_count();
        if entry.is_fetching() {
          stats.fetching += 1;
        }
        stats
      })
  }
}
