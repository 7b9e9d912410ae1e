//! Tracing setup. The dashboard owns the terminal, so it logs to a file;
//! one-shot commands log to stderr.

use color_eyre::{eyre::eyre, Result};
use std::fs::OpenOptions;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Transport crates that are chatty at debug level.
const NOISY_CRATES: &str = ",hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

fn filter(config: &Config) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("{}{}", config.environment.log_level(), NOISY_CRATES)))
}

/// Log to the configured file. Keep the guard alive until exit or buffered
/// lines are lost.
pub fn init_file(config: &Config) -> Result<WorkerGuard> {
  let path = config.log_path();
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", parent.display(), e))?;
  }

  let file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(&path)
    .map_err(|e| eyre!("Failed to open log file {}: {}", path.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(file);
  tracing_subscriber::fmt()
    .with_env_filter(filter(config))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

pub fn init_stderr(config: &Config) {
  tracing_subscriber::fmt()
    .with_env_filter(filter(config))
    .with_writer(std::io::stderr)
    .with_target(false)
    .compact()
    .init();
}
