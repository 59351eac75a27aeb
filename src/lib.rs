pub mod control;
pub mod db;
pub mod devices;
pub mod error;
pub mod models;
pub mod ports;
pub mod sampling;
pub mod service;
pub mod settings;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{error, info};

use service::{AppContext, LuxService};
use settings::SettingsStore;

const CONFIG_ENV: &str = "GROWLUX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "growlux.json";

pub fn run() {
    utils::init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(serve()) {
        error!("growlux exited with error: {err:#}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let settings = SettingsStore::new(config_path)?;
    let initial = settings.get();
    info!(
        "{} starting up (mode={}, timezone={}, config={})",
        initial.app_name,
        initial.mode,
        initial.timezone,
        settings.path().display()
    );

    let ctx = AppContext::open(settings).await?;
    let service = LuxService::new(ctx)?;
    service.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    service.stop().await?;
    info!("Shutdown complete");
    Ok(())
}
