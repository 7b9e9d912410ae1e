use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::api::retry::RetryPolicy;

/// Marker left in the endpoint URL of an unconfigured deployment.
const PLACEHOLDER_SCRIPT_ID: &str = "YOUR_SCRIPT_ID";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub environment: Environment,
  /// Custom title for header (defaults to "KPI Dashboard")
  pub title: Option<String>,
  /// Log file for the dashboard (defaults to kpitrack.log in the cache dir)
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs: u64,
  #[serde(default = "default_probe_timeout_ms")]
  pub probe_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
  30_000
}

fn default_max_retries() -> u32 {
  3
}

fn default_retry_delay_ms() -> u64 {
  1_000
}

fn default_cache_ttl_secs() -> u64 {
  300
}

fn default_probe_timeout_ms() -> u64 {
  5_000
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn cache_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.cache_ttl_secs.min(i64::MAX as u64) as i64)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      retry_delay: Duration::from_millis(self.retry_delay_ms),
    }
  }

  /// False while the URL still carries the deployment placeholder.
  pub fn is_backend_configured(&self) -> bool {
    !self.url.trim().is_empty() && !self.url.contains(PLACEHOLDER_SCRIPT_ID)
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  #[default]
  Development,
  Staging,
  Production,
}

impl Environment {
  /// Default tracing level, overridden by RUST_LOG.
  pub fn log_level(self) -> &'static str {
    match self {
      Environment::Development => "debug",
      Environment::Staging => "info",
      Environment::Production => "error",
    }
  }
}

impl FromStr for Environment {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "development" | "dev" => Ok(Environment::Development),
      "staging" => Ok(Environment::Staging),
      "production" | "prod" => Ok(Environment::Production),
      other => Err(format!("Unknown environment: {}", other)),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kpitrack.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kpitrack/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/kpitrack/config.yaml\n\
                 It needs at least `api.url` set to the deployed script URL."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kpitrack.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kpitrack").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub(crate) fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Where the dashboard writes its log.
  pub fn log_path(&self) -> PathBuf {
    self.log_file.clone().unwrap_or_else(|| {
      dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kpitrack")
        .join("kpitrack.log")
    })
  }

  /// Get the identity token from environment variables.
  ///
  /// Checks KPITRACK_ID_TOKEN first, then ID_TOKEN as fallback. A missing
  /// token is not an error: calls then go out anonymously.
  pub fn get_id_token() -> Option<String> {
    std::env::var("KPITRACK_ID_TOKEN")
      .or_else(|_| std::env::var("ID_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
