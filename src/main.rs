//! Image Classifier - Main Entry Point
//!
//! Loads every ONNX model from the models directory and serves predictions
//! over HTTP.

use anyhow::{Context, Result};
use genai_image_services::{
    api::{self, ClassifierState},
    config::AppConfig,
    logging,
    metrics::{MetricsReporter, ServiceMetrics},
    models::ModelRegistry,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    logging::init(&config.logging, env!("CARGO_CRATE_NAME"))?;

    info!("Starting Image Classifier");
    info!(
        models_dir = %config.classifier.models_dir,
        default_model = %config.classifier.default_model,
        input_size = config.classifier.input_size,
        "Configuration loaded successfully"
    );

    // Load all models up front; any failure aborts startup
    let registry = Arc::new(
        ModelRegistry::from_config(&config.classifier).context("Failed to load models")?,
    );
    info!(
        "Model registry initialized with {} models: {:?}",
        registry.len(),
        registry.model_names()
    );

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new("image-classifier"));

    let metrics_clone = metrics.clone();
    let interval = config.metrics.report_interval_secs;
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, interval);
        reporter.start().await;
    });

    let state = ClassifierState::new(registry, &config.classifier.allowed_extensions)
        .with_metrics(metrics.clone());
    let router = api::classifier::router(state);

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(api::shutdown_signal())
        .await
        .context("Classifier server error")?;

    // Print final summary
    info!("Image Classifier shutting down...");
    metrics.print_summary();

    Ok(())
}
