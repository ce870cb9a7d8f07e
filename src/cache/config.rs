use std::time::Duration;

/// Cache-wide defaults for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
  /// How long fetched data is served without refetching.
  pub stale_time: Duration,

  /// How long an unobserved, idle entry is kept before `collect_garbage` drops it.
  pub gc_time: Duration,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      stale_time: Duration::ZERO,
      gc_time: Duration::from_secs(5 * 60),
    }
  }
}

impl QueryConfig {
  pub const fn new(stale_time: Duration, gc_time: Duration) -> Self {
    Self {
      stale_time,
      gc_time,
    }
  }
}
