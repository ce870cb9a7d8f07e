mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod mutation;
mod posts;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "postq")]
#[command(about = "A terminal UI for posts, with a query cache and optimistic mutations")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./postq.yaml or $XDG_CONFIG_HOME/postq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the posts API
  #[arg(long)]
  api_url: Option<String>,

  /// Open this post on startup
  #[arg(short, long)]
  post: Option<u64>,

  /// Wait for the server before showing created posts
  #[arg(long)]
  no_optimistic: bool,

  /// How long fetched data stays fresh, in milliseconds
  #[arg(long)]
  stale_time_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = config::Config::load(args.config.as_deref())?;
  config.override_api_url(args.api_url);
  if args.no_optimistic {
    config.mutation.optimistic = false;
  }
  if let Some(ms) = args.stale_time_ms {
    config.query.stale_time_ms = ms;
  }

  // Keep the guard alive so buffered log lines are flushed on exit
  let _guard = logging::init(&config)?;
  info!(api = %config.api.base_url, "starting postq");

  let mut app = app::App::new(&config, args.post)?;
  app.run().await?;

  Ok(())
}
