//! Classifier HTTP routes

use crate::error::{ApiError, ApiResult};
use crate::metrics::ServiceMetrics;
use crate::models::{ModelRegistry, PredictError};
use crate::types::Prediction;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared state for the classifier routes
#[derive(Clone)]
pub struct ClassifierState {
    pub registry: Arc<ModelRegistry>,
    pub allowed_extensions: Arc<Vec<String>>,
    pub metrics: Arc<ServiceMetrics>,
}

impl ClassifierState {
    pub fn new(registry: Arc<ModelRegistry>, allowed_extensions: &[String]) -> Self {
        Self {
            registry,
            allowed_extensions: Arc::new(
                allowed_extensions
                    .iter()
                    .map(|ext| ext.to_lowercase())
                    .collect(),
            ),
            metrics: Arc::new(ServiceMetrics::new("image-classifier")),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

pub fn router(state: ClassifierState) -> Router {
    Router::new()
        .route("/prediction", post(predict_default))
        .route("/:model/prediction", post(predict_with_model))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn predict_default(
    State(state): State<ClassifierState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Prediction>> {
    let model = state.registry.default_model().to_string();
    classify(state, model, multipart).await
}

async fn predict_with_model(
    State(state): State<ClassifierState>,
    Path(model): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Prediction>> {
    classify(state, model, multipart).await
}

async fn health(State(state): State<ClassifierState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "default_model": state.registry.default_model(),
        "models": state.registry.model_names(),
    }))
}

async fn classify(
    state: ClassifierState,
    model: String,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Prediction>> {
    let start = Instant::now();

    if !state.registry.contains(&model) {
        warn!(model = %model, "Prediction requested for unknown model");
        state.metrics.record_failure("unknown_model", start.elapsed());
        return Err(ApiError::not_found(
            PredictError::UnknownModel(model).to_string(),
        ));
    }

    let (filename, bytes) = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            debug!(model = %model, error = %e, "Rejected upload");
            state.metrics.record_failure("invalid_upload", start.elapsed());
            return Err(e);
        }
    };

    if !state.is_allowed(&filename) {
        debug!(model = %model, filename = %filename, "Unsupported file format");
        state.metrics.record_failure("unsupported_format", start.elapsed());
        return Err(ApiError::invalid_input("File format not supported"));
    }

    let registry = state.registry.clone();
    let model_name = model.clone();
    let result = tokio::task::spawn_blocking(move || registry.predict(&model_name, &bytes))
        .await
        .map_err(|e| ApiError::unexpected(format!("Inference task failed: {}", e)))?;

    match result {
        Ok(timed) => {
            state.metrics.record_model_time(&model, timed.inference_time);
            state.metrics.record_success(start.elapsed());
            state.metrics.record_labels([&timed.prediction.label]);
            info!(
                model = %model,
                filename = %filename,
                label = %timed.prediction.label,
                confidence = timed.prediction.confidence,
                inference_time_us = timed.inference_time.as_micros(),
                "Image classified"
            );
            Ok(Json(timed.prediction))
        }
        Err(PredictError::UnknownModel(name)) => {
            state.metrics.record_failure("unknown_model", start.elapsed());
            Err(ApiError::not_found(PredictError::UnknownModel(name).to_string()))
        }
        Err(PredictError::Preprocess(e)) => {
            warn!(model = %model, filename = %filename, error = %e, "Image could not be decoded");
            state.metrics.record_failure("undecodable_image", start.elapsed());
            Err(ApiError::invalid_input("Image could not be decoded"))
        }
        Err(PredictError::Model(e)) => {
            error!(model = %model, filename = %filename, error = %e, "Inference failed");
            state.metrics.record_failure("inference", start.elapsed());
            Err(ApiError::collaborator(e.to_string()))
        }
    }
}

/// Pull the `file` field out of the form, returning its filename and contents
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(String, Vec<u8>), ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::invalid_input("No file provided"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_input(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::invalid_input("Invalid file"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::invalid_input(e.body_text()))?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(ApiError::invalid_input("No file provided"))
}
