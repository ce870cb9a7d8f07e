use thiserror::Error;

/// Error produced by a fetch or a mutation.
///
/// `Status` and `Transport` come from the remote service and are stored on the
/// query entry. `Cancelled` is only handed to callers that were awaiting a
/// fetch when it was cancelled; it never ends up in the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
  /// The service answered with a non-2xx status
  #[error("{message}")]
  Status { status: u16, message: String },

  /// The request never produced a usable response
  #[error("Network error: {0}")]
  Transport(String),

  #[error("Query was cancelled")]
  Cancelled,
}

impl QueryError {
  pub fn status(status: u16, message: impl Into<String>) -> Self {
    Self::Status {
      status,
      message: message.into(),
    }
  }
}
