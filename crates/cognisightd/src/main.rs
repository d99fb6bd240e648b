use anyhow::{Context, Result};
use cognisight_core::OnnxClassifier;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod backends;
mod config;
mod controller;
mod engine;
mod web;

use backends::Backends;
use config::Config;
use controller::Controller;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cognisightd starting");

    let config = Config::from_env().context("loading configuration")?;
    config.validate()?;
    tracing::info!(
        bind = %config.bind_addr,
        model = %config.model_path.display(),
        image_store = ?config.image_store,
        ledger = ?config.ledger,
        ledger_api = config.admin_token.is_some(),
        "configuration loaded"
    );

    // Load the model before anything listens, so a missing export fails fast.
    let model_path = config.model_path.to_string_lossy().into_owned();
    let classifier = OnnxClassifier::load(&model_path)
        .with_context(|| format!("loading classifier from {model_path}"))?;
    let engine = engine::spawn_engine(Box::new(classifier))?;

    let backends = Backends::build(&config).await?;
    let controller = Controller::new(engine, backends.images.clone(), backends.ledger.clone());
    let state = AppState {
        controller: Arc::new(controller),
        model_path,
        admin_token: config.admin_token.clone(),
    };

    tracing::info!("cognisightd ready");

    web::serve(&config, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    })
    .await?;

    tracing::info!("cognisightd shutting down");
    backends.shutdown().await;

    Ok(())
}
