//! File logging. The terminal belongs to the UI, so logs go to a file.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Install the global subscriber. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let path = config.log_file();
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .map(|p| p.to_path_buf())
    .unwrap_or_else(|| ".".into());
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let directive = filter_directive(
    std::env::var("POSTQ_LOG").ok(),
    std::env::var("RUST_LOG").ok(),
    &config.log.level,
  );
  let filter =
    EnvFilter::try_new(&directive).map_err(|e| eyre!("Invalid log filter {}: {}", directive, e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, file_name));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  tracing::info!(file = %path.display(), filter = %directive, "logging initialised");
  Ok(guard)
}

/// POSTQ_LOG wins over RUST_LOG, which wins over the configured level.
fn filter_directive(postq_log: Option<String>, rust_log: Option<String>, level: &str) -> String {
  postq_log
    .into_iter()
    .chain(rust_log)
    .find(|d| !d.trim().is_empty())
    .unwrap_or_else(|| level.to_string())
}
