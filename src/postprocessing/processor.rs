//! Postprocessing of a stored AI-generated image.
//!
//! Looks up the record, fetches the raw image, labels it, writes the
//! labels back as tags, generates and stores a thumbnail and records the
//! thumbnail key. Steps run strictly in order and stop at the first
//! failure. Writes already applied are not undone: a failure after the
//! tag update leaves the new tags on a record without a thumbnail.

use crate::config::AppConfig;
use crate::metrics::ServiceMetrics;
use crate::services::{
    DocumentStore, LabelAnnotator, LabelingError, ObjectStore, ObjectStoreError, StoreError,
    ThumbnailError, ThumbnailGenerator,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// The step at which processing stopped
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Image id is empty")]
    EmptyImageId,

    #[error("Document store lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error("No image record found for {0}")]
    RecordNotFound(String),

    #[error("No storage key found for {0}")]
    MissingStorageKey(String),

    #[error("Failed to retrieve image from object storage: {0}")]
    Fetch(#[source] ObjectStoreError),

    #[error("Object {0} is empty")]
    EmptyImage(String),

    #[error("Failed to retrieve labels: {0}")]
    Labeling(#[source] LabelingError),

    #[error("No labels detected")]
    NoLabels,

    #[error("Failed to update content tags: {0}")]
    TagUpdate(#[source] StoreError),

    #[error("Failed to create thumbnail: {0}")]
    Thumbnail(#[source] ThumbnailError),

    #[error("Failed to store thumbnail: {0}")]
    ThumbnailUpload(#[source] ObjectStoreError),

    #[error("Failed to update thumbnail key: {0}")]
    ThumbnailKeyUpdate(#[source] StoreError),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl ProcessingError {
    /// Short machine-friendly name, used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            ProcessingError::EmptyImageId => "empty_image_id",
            ProcessingError::Lookup(_) => "lookup",
            ProcessingError::RecordNotFound(_) => "record_not_found",
            ProcessingError::MissingStorageKey(_) => "missing_storage_key",
            ProcessingError::Fetch(_) => "fetch",
            ProcessingError::EmptyImage(_) => "empty_image",
            ProcessingError::Labeling(_) => "labeling",
            ProcessingError::NoLabels => "no_labels",
            ProcessingError::TagUpdate(_) => "tag_update",
            ProcessingError::Thumbnail(_) => "thumbnail",
            ProcessingError::ThumbnailUpload(_) => "thumbnail_upload",
            ProcessingError::ThumbnailKeyUpdate(_) => "thumbnail_key_update",
            ProcessingError::Unexpected(_) => "unexpected",
        }
    }

    /// Whether the record's tags were already updated when processing stopped
    pub fn left_partial_update(&self) -> bool {
        matches!(
            self,
            ProcessingError::Thumbnail(_)
                | ProcessingError::ThumbnailUpload(_)
                | ProcessingError::ThumbnailKeyUpdate(_)
                | ProcessingError::Unexpected(_)
        )
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub image_id: String,
    pub labels: Vec<String>,
    pub thumbnail_key: String,
}

/// Orchestrates the collaborators that enrich an image record
pub struct ContentProcessor {
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    labeler: Arc<dyn LabelAnnotator>,
    thumbnails: ThumbnailGenerator,
    images_bucket: String,
    thumbnails_bucket: String,
    metrics: Arc<ServiceMetrics>,
}

impl ContentProcessor {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        labeler: Arc<dyn LabelAnnotator>,
        thumbnails: ThumbnailGenerator,
    ) -> Self {
        let defaults = AppConfig::default().postprocessing;
        Self {
            documents,
            objects,
            labeler,
            thumbnails,
            images_bucket: defaults.images_bucket,
            thumbnails_bucket: defaults.thumbnails_bucket,
            metrics: Arc::new(ServiceMetrics::new("postprocessing")),
        }
    }

    /// Use the buckets and thumbnail settings from configuration
    pub fn configured(mut self, config: &AppConfig) -> Self {
        self.images_bucket = config.postprocessing.images_bucket.clone();
        self.thumbnails_bucket = config.postprocessing.thumbnails_bucket.clone();
        self.thumbnails = ThumbnailGenerator::from_config(&config.thumbnail);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    /// Storage key of the thumbnail for an image
    pub fn thumbnail_key(&self, image_id: &str) -> String {
        format!("{}.{}", image_id, self.thumbnails.format().extension())
    }

    /// Run the full pipeline for one image, logging and recording the outcome.
    pub async fn process_image(&self, image_id: &str) -> Result<ProcessedImage, ProcessingError> {
        let start = Instant::now();
        info!(image_id = %image_id, "Processing new image");

        let result = self.run(image_id).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(processed) => {
                self.metrics.record_success(elapsed);
                self.metrics.record_labels(&processed.labels);
                info!(
                    image_id = %image_id,
                    labels = processed.labels.len(),
                    thumbnail_key = %processed.thumbnail_key,
                    processing_time_ms = elapsed.as_millis(),
                    "Image processed"
                );
            }
            Err(e) => {
                self.metrics.record_failure(e.reason(), elapsed);
                error!(image_id = %image_id, reason = e.reason(), error = %e, "Image processing failed");
                if e.left_partial_update() {
                    warn!(
                        image_id = %image_id,
                        "Content tags were updated but no thumbnail was recorded"
                    );
                }
            }
        }

        result
    }

    async fn run(&self, image_id: &str) -> Result<ProcessedImage, ProcessingError> {
        if image_id.trim().is_empty() {
            return Err(ProcessingError::EmptyImageId);
        }

        let record = self
            .documents
            .find_image(image_id)
            .await
            .map_err(ProcessingError::Lookup)?
            .ok_or_else(|| ProcessingError::RecordNotFound(image_id.to_string()))?;

        let storage_key = record
            .storage_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProcessingError::MissingStorageKey(image_id.to_string()))?;

        let image_data = self
            .objects
            .get_object(&self.images_bucket, &storage_key)
            .await
            .map_err(ProcessingError::Fetch)?;
        if image_data.is_empty() {
            return Err(ProcessingError::EmptyImage(storage_key));
        }

        let labels = self
            .labeler
            .labels(&image_data)
            .await
            .map_err(ProcessingError::Labeling)?;
        if labels.is_empty() {
            return Err(ProcessingError::NoLabels);
        }
        self.documents
            .add_content_tags(image_id, &labels)
            .await
            .map_err(ProcessingError::TagUpdate)?;

        let generator = self.thumbnails.clone();
        let thumbnail = tokio::task::spawn_blocking(move || generator.generate(&image_data))
            .await
            .map_err(|e| ProcessingError::Unexpected(e.to_string()))?
            .map_err(ProcessingError::Thumbnail)?;

        let thumbnail_key = self.thumbnail_key(image_id);
        self.objects
            .put_object(
                &self.thumbnails_bucket,
                &thumbnail_key,
                thumbnail.bytes,
                thumbnail.format.content_type(),
            )
            .await
            .map_err(ProcessingError::ThumbnailUpload)?;
        self.documents
            .set_thumbnail_key(image_id, &thumbnail_key)
            .await
            .map_err(ProcessingError::ThumbnailKeyUpdate)?;

        Ok(ProcessedImage {
            image_id: image_id.to_string(),
            labels,
            thumbnail_key,
        })
    }
}
