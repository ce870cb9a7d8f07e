//! Fetch coordination: freshness checks, request deduplication and
//! background refetching.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::QueryClient;
use super::entry::{AnyData, ErasedFetcher, FetchResult, InFlight, QueryEntry, SharedFetch};
use super::error::QueryError;
use super::key::QueryKey;

/// Outcome of asking the cache for a key.
enum Begin {
  /// Fresh data, no request needed
  Fresh(AnyData),
  /// A request is (now) in flight
  Pending(SharedFetch),
}

/// Box a typed fetcher so the cache can store and call it.
pub(crate) fn erase_fetcher<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
  T: Send + Sync + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
{
  Arc::new(move || {
    let fut = fetcher();
    async move { fut.await.map(|data| Arc::new(data) as AnyData) }.boxed()
  })
}

fn downcast<T>(key: &QueryKey, data: &AnyData) -> Result<T, QueryError>
where
  T: Clone + 'static,
{
  data
    .downcast_ref::<T>()
    .cloned()
    .ok_or_else(|| QueryError::Transport(format!("cached data for {} has another type", key)))
}

impl QueryClient {
  /// Return data for `key`, fetching only when needed.
  ///
  /// Data younger than `stale_time` is returned as is. Otherwise the caller
  /// joins the request already in flight for `key`, or starts one with
  /// `fetcher`. However many callers arrive at once, there is at most one
  /// request per key.
  ///
  /// A failed fetch stores the error on the entry and keeps whatever data
  /// was there before.
  pub async fn ensure_fresh<T, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
    stale_time: Duration,
  ) -> Result<T, QueryError>
  where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let pending = match self.begin::<T>(key, erase_fetcher(fetcher), stale_time) {
      Begin::Fresh(data) => return downcast(key, &data),
      Begin::Pending(pending) => pending,
    };
    let data = pending.await?;
    downcast(key, &data)
  }

  /// Same rules as [`ensure_fresh`](QueryClient::ensure_fresh), but only
  /// kicks off the request. Progress is visible through observers.
  pub fn prefetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F, stale_time: Duration)
  where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    self.begin::<T>(key, erase_fetcher(fetcher), stale_time);
  }

  pub(crate) fn prefetch_erased<T>(
    &self,
    key: &QueryKey,
    fetcher: &ErasedFetcher,
    stale_time: Duration,
  ) where
    T: Clone + Send + Sync + 'static,
  {
    self.begin::<T>(key, fetcher.clone(), stale_time);
  }

  /// Drop any request in flight for `key` and start a new one with the
  /// fetcher its observers registered. Returns false if there is none.
  pub fn refetch(&self, key: &QueryKey) -> bool {
    let mut cache = self.lock();
    let id = cache.next_id();
    let entry = cache.entry_mut(key);
    let Some(fetcher) = entry.fetcher.clone() else {
      return false;
    };
    entry.cancel_fetch();
    let _pending = self.start_fetch(entry, key, id, &fetcher);
    entry.notify();
    true
  }

  fn begin<T>(&self, key: &QueryKey, fetcher: ErasedFetcher, stale_time: Duration) -> Begin
  where
    T: Clone + Send + Sync + 'static,
  {
    let mut cache = self.lock();
    let id = cache.next_id();
    let now = Instant::now();
    let entry = cache.entry_mut(key);
    entry.last_accessed = now;
    entry.fetcher = Some(fetcher.clone());

    if entry.is_fresh(stale_time, now) {
      if let Some(data) = entry.data.as_ref().filter(|d| d.is::<T>()) {
        debug!(%key, "serving fresh data from cache");
        return Begin::Fresh(data.clone());
      }
    }

    if let Some(in_flight) = &entry.in_flight {
      debug!(%key, fetch = in_flight.id, "joining in-flight fetch");
      return Begin::Pending(in_flight.future.clone());
    }

    let pending = self.start_fetch(entry, key, id, &fetcher);
    entry.notify();
    Begin::Pending(pending)
  }

  /// Spawn the request and record it as the entry's only in-flight fetch.
  ///
  /// The task writes its own result into the cache, so it lands even when
  /// nobody awaits it. Must be called with the cache lock held; the task
  /// cannot apply anything before the lock is released.
  pub(crate) fn start_fetch(
    &self,
    entry: &mut QueryEntry,
    key: &QueryKey,
    id: u64,
    fetcher: &ErasedFetcher,
  ) -> SharedFetch {
    info!(%key, fetch = id, "fetch started");

    let request = fetcher();
    let client = self.clone();
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
      // A panicking fetcher still has to release the entry
      let result = match AssertUnwindSafe(request).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Transport("fetch panicked".to_string())),
      };
      client.complete_fetch(&task_key, id, &result);
      result
    });
    let abort = handle.abort_handle();

    let future = async move {
      match handle.await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Cancelled),
      }
    }
    .boxed()
    .shared();

    entry.begin_fetch(InFlight {
      id,
      future: future.clone(),
      abort,
      after_invalidation: entry.invalidated,
    });
    future
  }

  fn complete_fetch(&self, key: &QueryKey, id: u64, result: &FetchResult) {
    let mut cache = self.lock();
    let next_id = cache.next_id();
    let Some(entry) = cache.entries.get_mut(key) else {
      debug!(%key, fetch = id, "entry gone, discarding fetch result");
      return;
    };
    if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
      debug!(%key, fetch = id, "fetch superseded, discarding result");
      return;
    }

    entry.in_flight = None;
    match result {
      Ok(data) => {
        entry.store_success(data.clone());
        info!(%key, fetch = id, "fetch succeeded");
      }
      Err(error) => {
        entry.store_error(error.clone());
        warn!(%key, fetch = id, %error, "fetch failed");
      }
    }

    if std::mem::take(&mut entry.refetch_pending) {
      // Whatever landed predates the invalidation
      entry.invalidated = true;
      match entry.fetcher.clone() {
        Some(fetcher) if entry.observer_count() > 0 => {
          debug!(%key, fetch = next_id, "running refetch queued by invalidation");
          let _pending = self.start_fetch(entry, key, next_id, &fetcher);
        }
        _ => {}
      }
    }
    entry.notify();
  }
}
