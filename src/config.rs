use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::QueryConfig;

pub const DEFAULT_API_URL: &str = "https://jsonplaceholder.typicode.com";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub query: QuerySettings,
  pub mutation: MutationConfig,
  pub ui: UiConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Per-request timeout; none if unset
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_API_URL.to_string(),
      timeout_secs: Some(30),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
  pub stale_time_ms: u64,
  pub gc_time_ms: u64,
}

impl Default for QuerySettings {
  fn default() -> Self {
    Self {
      stale_time_ms: 10_000,
      gc_time_ms: 300_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
  /// Show created posts in the list before the server confirms them
  pub optimistic: bool,
}

impl Default for MutationConfig {
  fn default() -> Self {
    Self { optimistic: true }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
  pub tick_rate_ms: u64,
}

impl Default for UiConfig {
  fn default() -> Self {
    Self { tick_rate_ms: 250 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive, overridden by POSTQ_LOG or RUST_LOG
  pub level: String,
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./postq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/postq/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists. POSTQ_API_URL
  /// overrides the API URL from any source.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.override_api_url(std::env::var("POSTQ_API_URL").ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("postq.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("postq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file deserializes to unit, not to a struct of defaults
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Replace the API URL if `url` is set and non-empty.
  pub fn override_api_url(&mut self, url: Option<String>) {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
      self.api.base_url = url;
    }
  }

  pub fn query_config(&self) -> QueryConfig {
    QueryConfig::new(
      Duration::from_millis(self.query.stale_time_ms),
      Duration::from_millis(self.query.gc_time_ms),
    )
  }

  pub fn tick_rate(&self) -> Duration {
    Duration::from_millis(self.ui.tick_rate_ms.max(1))
  }

  /// Log file path: configured, else `<data_dir>/postq/postq.log`.
  pub fn log_file(&self) -> PathBuf {
    self.log.file.clone().unwrap_or_else(|| {
      dirs::data_dir()
        .map(|d| d.join("postq"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("postq.log")
    })
  }
}
