//! Label detection through the Google Cloud Vision REST API

use crate::config::VisionConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a label annotator
#[derive(Error, Debug)]
pub enum LabelingError {
    /// Carries no URL
    #[error("Vision API request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Vision API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Produces descriptive labels for an image.
#[async_trait]
pub trait LabelAnnotator: Send + Sync {
    /// Labels for the image, in the order the provider returned them.
    /// An empty list means nothing was detected.
    async fn labels(&self, image_data: &[u8]) -> Result<Vec<String>, LabelingError>;
}

#[derive(Debug, Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<AnnotateImageRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: Vec<Feature<'a>>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    #[serde(default)]
    error: Option<ResponseStatus>,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Request header carrying the API key; the URL never contains it
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Cloud Vision `images:annotate` client requesting `LABEL_DETECTION`
pub struct VisionLabelAnnotator {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: Option<u32>,
}

impl VisionLabelAnnotator {
    pub fn new(config: &VisionConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &VisionConfig) -> Self {
        if config.api_key.is_empty() {
            warn!("Vision API key is not configured, label requests will be rejected");
        }
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            max_results: config.max_results,
        }
    }

    fn build_request(&self, image_data: &[u8]) -> AnnotateRequest<'static> {
        AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(image_data),
                },
                features: vec![Feature {
                    kind: "LABEL_DETECTION",
                    max_results: self.max_results,
                }],
            }],
        }
    }
}

fn request_error(e: reqwest::Error) -> LabelingError {
    LabelingError::Request(e.without_url())
}

/// Flatten label descriptions from every response, skipping failed ones
fn collect_labels(response: AnnotateResponse) -> Vec<String> {
    let mut labels = Vec::new();
    for resp in response.responses {
        if let Some(status) = resp.error {
            warn!(code = status.code, message = %status.message, "Vision API reported an error");
        }
        labels.extend(resp.label_annotations.into_iter().map(|l| l.description));
    }
    labels
}

#[async_trait]
impl LabelAnnotator for VisionLabelAnnotator {
    async fn labels(&self, image_data: &[u8]) -> Result<Vec<String>, LabelingError> {
        let payload = self.build_request(image_data);

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LabelingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: AnnotateResponse = response.json().await.map_err(request_error)?;
        let labels = collect_labels(result);

        debug!(count = labels.len(), labels = ?labels, "Received labels");
        Ok(labels)
    }
}
