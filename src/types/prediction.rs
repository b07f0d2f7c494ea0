//! Classification result returned by the classifier service

use serde::{Deserialize, Serialize};

/// Top-1 prediction for a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class label
    pub label: String,

    /// Name of the model that produced the prediction
    pub model: String,

    /// Probability of the predicted class (0.0 - 1.0)
    pub confidence: f32,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: impl Into<String>, model: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            model: model.into(),
            confidence,
        }
    }
}
