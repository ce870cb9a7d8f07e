//! Per-key cache state.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::error::QueryError;
use super::key::QueryKey;

/// Type-erased cached payload. Typed access goes through `downcast_ref`.
pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;

pub(crate) type FetchResult = Result<AnyData, QueryError>;

/// Fetcher registered by an observer, callable any number of times.
pub(crate) type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchResult> + Send + Sync>;

/// In-flight fetch result, awaitable by any number of callers.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Lifecycle status of a query entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStatus {
  /// Never fetched and nothing written
  #[default]
  Idle,
  /// First fetch in flight, no data yet
  Loading,
  /// Holds data from the last fetch or write
  Success,
  /// Last fetch failed; earlier data, if any, is kept
  Error,
}

/// The single in-flight request for a key.
pub(crate) struct InFlight {
  pub id: u64,
  pub future: SharedFetch,
  pub abort: AbortHandle,
  /// Started while the entry was already invalidated, so it reflects
  /// that invalidation
  pub after_invalidation: bool,
}

pub(crate) struct QueryEntry {
  pub data: Option<AnyData>,
  /// Monotonic time of the last data change, used for staleness
  pub data_updated_at: Option<Instant>,
  /// Wall-clock time of the last data change, for display
  pub updated_at: Option<DateTime<Utc>>,
  pub status: QueryStatus,
  pub error: Option<QueryError>,
  pub invalidated: bool,
  /// An invalidation arrived while a fetch was in flight; that fetch may
  /// predate it, so one more fetch follows
  pub refetch_pending: bool,
  pub in_flight: Option<InFlight>,
  pub fetcher: Option<ErasedFetcher>,
  /// Bumped on every data change
  pub version: u64,
  pub last_accessed: Instant,
  notify: watch::Sender<u64>,
}

impl QueryEntry {
  pub fn new() -> Self {
    let (notify, _) = watch::channel(0);
    Self {
      data: None,
      data_updated_at: None,
      updated_at: None,
      status: QueryStatus::Idle,
      error: None,
      invalidated: false,
      refetch_pending: false,
      in_flight: None,
      fetcher: None,
      version: 0,
      last_accessed: Instant::now(),
      notify,
    }
  }

  /// Data exists, is not invalidated, and was updated within `stale_time`.
  pub fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
    if self.invalidated || self.data.is_none() {
      return false;
    }
    self
      .data_updated_at
      .map(|at| now.saturating_duration_since(at) < stale_time)
      .unwrap_or(false)
  }

  pub fn is_fetching(&self) -> bool {
    self.in_flight.is_some()
  }

  pub fn observer_count(&self) -> usize {
    self.notify.receiver_count()
  }

  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.notify.subscribe()
  }

  /// Wake every observer of this key.
  pub fn notify(&self) {
    self.notify.send_modify(|n| *n = n.wrapping_add(1));
  }

  pub fn store_success(&mut self, data: AnyData) {
    self.data = Some(data);
    self.data_updated_at = Some(Instant::now());
    self.updated_at = Some(Utc::now());
    self.status = QueryStatus::Success;
    self.error = None;
    self.invalidated = false;
    self.version += 1;
  }

  pub fn store_error(&mut self, error: QueryError) {
    self.status = QueryStatus::Error;
    self.error = Some(error);
  }

  pub fn begin_fetch(&mut self, in_flight: InFlight) {
    if self.data.is_none() {
      self.status = QueryStatus::Loading;
    }
    self.in_flight = Some(in_flight);
  }

  /// Detach and abort the in-flight fetch. Returns false if there was none.
  ///
  /// The status is derived from what the entry holds now, since data may
  /// have been written while the fetch ran: `Success` with data, `Error`
  /// when only an error is stored, `Idle` otherwise.
  pub fn cancel_fetch(&mut self) -> bool {
    let Some(in_flight) = self.in_flight.take() else {
      return false;
    };
    in_flight.abort.abort();
    self.refetch_pending = false;
    self.status = if self.data.is_some() {
      QueryStatus::Success
    } else if self.error.is_some() {
      QueryStatus::Error
    } else {
      QueryStatus::Idle
    };
    true
  }

  pub fn state(&self) -> EntryState {
    EntryState {
      status: self.status,
      error: self.error.clone(),
      is_fetching: self.is_fetching(),
      invalidated: self.invalidated,
      has_data: self.data.is_some(),
      updated_at: self.updated_at,
      version: self.version,
    }
  }
}

/// Read-only view of an entry's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryState {
  pub status: QueryStatus,
  pub error: Option<QueryError>,
  pub is_fetching: bool,
  pub invalidated: bool,
  pub has_data: bool,
  pub updated_at: Option<DateTime<Utc>>,
  pub version: u64,
}

impl EntryState {
  /// A request is in flight and there is no data to show in the meantime.
  pub fn is_loading(&self) -> bool {
    self.is_fetching && !self.has_data
  }
}

/// Exact copy of an entry's state, taken before an optimistic write so the
/// write can be undone.
#[derive(Clone)]
pub struct QuerySnapshot {
  pub(crate) key: QueryKey,
  pub(crate) data: Option<AnyData>,
  pub(crate) data_updated_at: Option<Instant>,
  pub(crate) updated_at: Option<DateTime<Utc>>,
  pub(crate) status: QueryStatus,
  pub(crate) error: Option<QueryError>,
  pub(crate) invalidated: bool,
  /// Entry version once the snapshot owner's own write landed
  pub(crate) expected_version: u64,
}

impl QuerySnapshot {
  pub(crate) fn capture(key: &QueryKey, entry: &QueryEntry) -> Self {
    Self {
      key: key.clone(),
      data: entry.data.clone(),
      data_updated_at: entry.data_updated_at,
      updated_at: entry.updated_at,
      status: entry.status,
      error: entry.error.clone(),
      invalidated: entry.invalidated,
      expected_version: entry.version,
    }
  }
}

impl fmt::Debug for QuerySnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QuerySnapshot")
      .field("key", &self.key)
      .field("has_data", &self.data.is_some())
      .field("status", &self.status)
      .field("expected_version", &self.expected_version)
      .finish_non_exhaustive()
  }
}

/// What `restore` found when putting a snapshot back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
  /// Nobody wrote to the key after the snapshot owner's patch
  Clean,
  /// Another write landed in between and was overwritten by the restore
  Interleaved,
}

/// Counts shown in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: usize,
  pub fetching: usize,
  pub observers: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_freshness_window() {
    let mut entry = QueryEntry::new();
    assert!(!entry.is_fresh(Duration::from_secs(10), Instant::now()));

    entry.store_success(Arc::new(1u32));
    assert!(entry.is_fresh(Duration::from_secs(10), Instant::now()));

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(!entry.is_fresh(Duration::from_secs(10), Instant::now()));
  }

  #[tokio::test]
  async fn test_invalidated_is_never_fresh() {
    let mut entry = QueryEntry::new();
    entry.store_success(Arc::new(1u32));
    entry.invalidated = true;
    assert!(!entry.is_fresh(Duration::from_secs(3600), Instant::now()));
  }

  #[tokio::test]
  async fn test_store_error_keeps_data() {
    let mut entry = QueryEntry::new();
    entry.store_success(Arc::new(String::from("good")));
    entry.store_error(QueryError::status(500, "Error fetching data"));

    assert_eq!(entry.status, QueryStatus::Error);
    let data = entry.data.as_ref().and_then(|d| d.downcast_ref::<String>());
    assert_eq!(data.map(String::as_str), Some("good"));
  }

  #[tokio::test]
  async fn test_observer_count_tracks_receivers() {
    let entry = QueryEntry::new();
    assert_eq!(entry.observer_count(), 0);
    let rx = entry.subscribe();
    assert_eq!(entry.observer_count(), 1);
    drop(rx);
    assert_eq!(entry.observer_count(), 0);
  }

  #[test]
  fn test_loading_requires_fetch_without_data() {
    let mut state = QueryEntry::new().state();
    assert!(!state.is_loading());
    state.is_fetching = true;
    assert!(state.is_loading());
    state.has_data = true;
    assert!(!state.is_loading());
  }
}
