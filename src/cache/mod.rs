//! In-memory query cache with fetch deduplication and optimistic writes.
//!
//! This module provides a TanStack Query style cache:
//! - Entries are addressed by structural [`QueryKey`]s and created lazily
//! - At most one request per key is in flight; concurrent readers share it
//! - Data younger than a stale time is served without a request
//! - Writes, invalidation and cancellation are synchronous and visible to
//!   every observer immediately
//! - Snapshots let optimistic writes be rolled back exactly

mod client;
mod config;
mod entry;
mod error;
mod fetch;
mod key;

pub use client::QueryClient;
pub use config::QueryConfig;
pub use entry::{CacheStats, QuerySnapshot, QueryStatus, RestoreOutcome};
pub use error::QueryError;
pub use key::QueryKey;

pub(crate) use entry::ErasedFetcher;
pub(crate) use fetch::erase_fetcher;
