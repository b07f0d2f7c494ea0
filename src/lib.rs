//! GenAI Image Services Library
//!
//! Two HTTP services over AI-generated images: an ONNX image classifier and
//! a postprocessing worker that labels images, writes tags and stores
//! thumbnails.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod postprocessing;
pub mod preprocess;
pub mod services;
pub mod types;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use models::ModelRegistry;
pub use postprocessing::{ContentProcessor, ProcessedImage, ProcessingError};
pub use preprocess::ImageTensorizer;
pub use types::{ImageRecord, Prediction};
