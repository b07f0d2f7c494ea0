//! Image classifier models

pub mod inference;
pub mod loader;
pub mod registry;

pub use inference::{Classifier, ModelError, OnnxClassifier};
pub use loader::ModelLoader;
pub use registry::{ModelRegistry, PredictError};
