//! One-shot batch run against the JSON job store.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gbatch_providers::JsonFileJobStore;
use gbatch_worker::{BatchDriver, HttpProviderFactory, WorkerConfig};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("gbatch=info,info"))?;

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Ignore the error if another provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting gbatch-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = JsonFileJobStore::open(&config.store_path)
        .await
        .with_context(|| format!("opening job store {}", config.store_path.display()))?;

    let factory = HttpProviderFactory::new(config.clone());
    let driver = BatchDriver::new(config, Arc::new(store), Arc::new(factory));

    match driver.run().await {
        Ok(summary) => {
            info!(
                succeeded = summary.progress.succeeded,
                failed = summary.progress.failed,
                "Run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}
