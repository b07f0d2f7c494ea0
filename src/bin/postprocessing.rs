//! Postprocessing Service - Main Entry Point
//!
//! Labels stored images, records the labels as content tags and stores a
//! thumbnail. Triggered over HTTP and, optionally, by database inserts.

use anyhow::{Context, Result};
use genai_image_services::{
    api::{self, PostprocessingState},
    config::AppConfig,
    logging,
    metrics::{MetricsReporter, ServiceMetrics},
    postprocessing::{run_insert_listener, ContentProcessor},
    services::{MongoImageStore, S3ObjectStore, ThumbnailGenerator, VisionLabelAnnotator},
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    logging::init(&config.logging, env!("CARGO_CRATE_NAME"))?;

    info!("Starting Postprocessing Service");
    info!(
        images_bucket = %config.postprocessing.images_bucket,
        thumbnails_bucket = %config.postprocessing.thumbnails_bucket,
        thumbnail_format = ?config.thumbnail.format,
        "Configuration loaded successfully"
    );

    // Connect collaborators
    let documents = Arc::new(
        MongoImageStore::connect(&config.database)
            .await
            .context("Failed to connect to content database")?,
    );
    let objects = Arc::new(S3ObjectStore::connect(&config.storage).await);
    let labeler = Arc::new(VisionLabelAnnotator::new(&config.vision));

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new("postprocessing"));

    let metrics_clone = metrics.clone();
    let interval = config.metrics.report_interval_secs;
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, interval);
        reporter.start().await;
    });

    let processor = Arc::new(
        ContentProcessor::new(
            documents.clone(),
            objects,
            labeler,
            ThumbnailGenerator::from_config(&config.thumbnail),
        )
        .configured(&config)
        .with_metrics(metrics.clone()),
    );

    if config.postprocessing.watch_inserts {
        let inserts = documents
            .watch_inserts()
            .await
            .context("Failed to watch content database for inserts")?;
        let processor = processor.clone();
        let workers = config.postprocessing.workers;
        tokio::spawn(async move {
            run_insert_listener(inserts, processor, workers).await;
            error!("Insert stream closed, images are no longer processed on insert");
        });
    }

    let router = api::postprocessing::router(PostprocessingState { processor });

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(api::shutdown_signal())
        .await
        .context("Postprocessing server error")?;

    // Print final summary
    info!("Postprocessing Service shutting down...");
    metrics.print_summary();

    Ok(())
}
