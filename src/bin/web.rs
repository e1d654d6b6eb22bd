#![cfg(not(tarpaulin_include))]

use dashboard::app;
use dashboard::settings::Settings;
use std::env;
use std::path::PathBuf;

/// Main entry point for the dashboard web server
///
/// An optional first argument names a TOML configuration file; without
/// it `config/dashboard.toml` is used when present. `RUST_LOG` controls
/// log verbosity.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    app::run(settings).await
}
