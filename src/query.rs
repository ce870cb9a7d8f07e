//! Query observers: the view-side handle on a cached query.
//!
//! Inspired by TanStack Query, a `Query<T>` subscribes to one key of a shared
//! [`QueryClient`], starts fetches through it and keeps a local snapshot of
//! the entry for rendering.
//!
//! # Example
//!
//! ```ignore
//! let api = api.clone();
//! let mut query = Query::new(client.clone(), QueryKey::new("posts"), move || {
//!     let api = api.clone();
//!     async move { api.list_posts().await }
//! })
//! .with_stale_time(Duration::from_secs(10));
//!
//! // Start fetching (no-op while cached data is fresh)
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // Entry changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::{erase_fetcher, ErasedFetcher, QueryClient, QueryError, QueryKey, QueryStatus};

/// The state of a query, as a view renders it
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// First fetch in flight, nothing to show yet
  Loading,
  /// Data is available
  Success(T),
  /// Last fetch failed
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Observer of one cached query.
///
/// Query<T> encapsulates:
/// - The fetching logic (via a closure registered with the cache)
/// - A subscription to the key, so changes made by anyone are picked up
/// - The stale time this observer tolerates
///
/// Several observers of the same key share one in-flight request and end up
/// in the same state. Dropping the observer unsubscribes it.
pub struct Query<T> {
  client: QueryClient,
  key: QueryKey,
  fetcher: ErasedFetcher,
  stale_time: Duration,
  receiver: watch::Receiver<u64>,
  state: QueryState<T>,
  is_fetching: bool,
  updated_at: Option<DateTime<Utc>>,
}

impl<T> Query<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Create an observer for `key` that fetches with `fetcher`.
  ///
  /// The stale time defaults to the client's configured one. Nothing is
  /// fetched until `fetch()` is called.
  pub fn new<F, Fut>(client: QueryClient, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let fetcher = erase_fetcher(fetcher);
    let receiver = client.observe(&key, fetcher.clone());
    let stale_time = client.config().stale_time;

    let mut query = Self {
      client,
      key,
      fetcher,
      stale_time,
      receiver,
      state: QueryState::Idle,
      is_fetching: false,
      updated_at: None,
    };
    query.sync();
    query
  }

  /// Set how long fetched data is served without refetching.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// First fetch in flight and no data to show.
  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Any fetch in flight, including background refreshes.
  pub fn is_fetching(&self) -> bool {
    self.is_fetching
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// When the data shown was last written.
  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.updated_at
  }

  /// Check if the data is stale (older than stale_time or invalidated).
  pub fn is_stale(&self) -> bool {
    self.client.is_stale(&self.key, self.stale_time)
  }

  /// Fetch unless fresh data is cached or a request is already in flight.
  pub fn fetch(&mut self) {
    self
      .client
      .prefetch_erased::<T>(&self.key, &self.fetcher, self.stale_time);
    self.sync();
  }

  /// Force a refetch, replacing any pending request.
  pub fn refetch(&mut self) {
    self.client.refetch(&self.key);
    self.sync();
  }

  /// Pick up changes to the entry.
  ///
  /// Returns `true` if the entry changed since the last poll.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.receiver.has_changed() {
      Ok(true) => {
        self.sync();
        true
      }
      // Sender gone means the cache was cleared; nothing more will arrive
      Ok(false) | Err(_) => false,
    }
  }

  fn sync(&mut self) {
    self.receiver.borrow_and_update();

    let Some((data, entry)) = self.client.read::<T>(&self.key) else {
      self.state = QueryState::Idle;
      self.is_fetching = false;
      self.updated_at = None;
      return;
    };

    self.is_fetching = entry.is_fetching;
    self.updated_at = entry.updated_at;
    self.state = if entry.is_loading() {
      QueryState::Loading
    } else if entry.status == QueryStatus::Error {
      QueryState::Error(
        entry
          .error
          .map(|e| e.to_string())
          .unwrap_or_else(|| "Unknown error".to_string()),
      )
    } else {
      match data {
        Some(data) => QueryState::Success(data),
        None => QueryState::Idle,
      }
    };
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("is_fetching", &self.is_fetching)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}
