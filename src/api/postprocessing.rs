//! Postprocessing HTTP routes

use crate::error::{ApiError, ApiResult};
use crate::postprocessing::ContentProcessor;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct PostprocessingState {
    pub processor: Arc<ContentProcessor>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessImageRequest {
    #[serde(rename = "imageId", default)]
    pub image_id: Option<String>,
}

pub fn router(state: PostprocessingState) -> Router {
    Router::new()
        .route("/images", post(process_image))
        .route("/health", get(health))
        .with_state(state)
}

async fn process_image(
    State(state): State<PostprocessingState>,
    payload: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let image_id = match payload {
        Ok(Json(request)) => request.image_id.filter(|id| !id.trim().is_empty()),
        Err(e) => {
            debug!(error = %e, "Rejected request body");
            None
        }
    }
    .ok_or_else(|| ApiError::invalid_input("Image ID is required"))?;

    state
        .processor
        .process_image(&image_id)
        .await
        .map_err(|_| ApiError::collaborator("Failed to process image"))?;

    Ok(Json(json!({ "message": "Image processed successfully" })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
