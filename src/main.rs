mod api;
mod app;
mod auth;
mod cache;
mod cli;
mod commands;
mod config;
mod event;
mod export;
mod kpi;
mod logging;
mod notify;
mod store;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::warn;

use crate::auth::{Identity, SessionIdentity};
use crate::config::{Config, Environment};

#[derive(Parser, Debug)]
#[command(name = "kpitrack")]
#[command(about = "A terminal dashboard for the spreadsheet-backed KPI task tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kpitrack/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Environment overriding the config file (development, staging, production)
  #[arg(short, long, global = true)]
  env: Option<Environment>,

  /// One-shot command; the dashboard opens when omitted
  #[command(subcommand)]
  command: Option<cli::Command>,
}

/// Identity from the environment token, if one is set and readable.
fn load_identity() -> Option<Identity> {
  let token = Config::get_id_token()?;
  match Identity::from_token(&token) {
    Ok(identity) => Some(identity),
    Err(e) => {
      warn!("Ignoring identity token: {}", e);
      None
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(environment) = args.env {
    config.environment = environment;
  }

  match args.command {
    Some(command) => {
      logging::init_stderr(&config);
      let session = SessionIdentity::new(load_identity());
      cli::run(command, &config, session).await
    }
    None => {
      let _guard = logging::init_file(&config)?;
      let session = SessionIdentity::new(load_identity());
      let client = api::ApiClient::new(&config, session.clone())?;

      // Initialize and run the app
      let mut app = app::App::new(config, client, session);
      app.run().await
    }
  }
}
