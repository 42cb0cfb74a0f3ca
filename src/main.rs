//! Stockout Risk Scoring - Main Entry Point
//!
//! Loads the pipeline (downloading it on first run), then serves the upload
//! interface. No upload is accepted until the pipeline is ready.

use anyhow::{Context, Result};
use std::sync::Arc;
use stockout_risk_scoring::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, ScoringMetrics},
    server::{build_router, AppState},
    ModelLoader, Scorer,
};
use tracing::info;

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!("Starting Stockout Risk Scoring");
    info!(
        model_url = %config.model.url,
        model_path = %config.model.path,
        "Configuration loaded successfully"
    );

    // Load the pipeline before accepting any upload
    let loader = ModelLoader::new(&config.model);
    let pipeline = loader
        .get_pipeline()
        .await
        .context("Pipeline is unavailable; refusing to start")?;

    let scorer = Arc::new(Scorer::new(
        pipeline,
        config.model.positive_class,
        config.scoring.clone(),
    ));
    info!(pipeline = %scorer.pipeline_name(), "Scorer initialized");

    let metrics = Arc::new(ScoringMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let app = build_router(
        AppState::new(scorer, metrics.clone()),
        config.server.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Upload interface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
