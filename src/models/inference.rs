//! Single-image classification with ONNX Runtime

use crate::models::loader::LoadedModel;
use crate::preprocess::ImageTensor;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while running a classifier
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Model {0} produced no class scores")]
    EmptyOutput(String),

    #[error("Model {model} returned {outputs} scores for {labels} labels")]
    LabelMismatch {
        model: String,
        outputs: usize,
        labels: usize,
    },

    #[error("Model {0} produced a non-finite score")]
    NonFinite(String),

    #[error("Session lock poisoned for model {0}")]
    Lock(String),
}

/// Something that turns a preprocessed image into class probabilities.
pub trait Classifier: Send + Sync {
    /// Class names, indexed like the returned probabilities
    fn labels(&self) -> &[String];

    /// Class probabilities for one image, summing to 1
    fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

/// Classifier backed by an ONNX Runtime session.
///
/// Sessions need exclusive access to run, so concurrent requests for the
/// same model are serialized on the mutex.
pub struct OnnxClassifier {
    name: String,
    labels: Vec<String>,
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            name: model.name.clone(),
            labels: model.labels.clone(),
            model: Mutex::new(model),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the session and copy out the raw scores
    fn run_session(model: &mut LoadedModel, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        use ort::value::Tensor;

        let input_tensor = Tensor::from_array((input.shape.clone(), input.data.clone()))?;

        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input_tensor])?;

        if let Some(output) = outputs.get(model.output_name.as_str()) {
            if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
                return Ok(data.to_vec());
            }
        }

        // Fall back to the first float tensor output
        for (name, output) in outputs.iter() {
            if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
                debug!(model = %model.name, output = %name, "Extracted scores (fallback)");
                return Ok(data.to_vec());
            }
        }

        Err(ModelError::EmptyOutput(model.name.clone()))
    }
}

impl Classifier for OnnxClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        let raw = {
            let mut guard = self
                .model
                .lock()
                .map_err(|_| ModelError::Lock(self.name.clone()))?;
            let model: &mut LoadedModel = &mut guard;
            Self::run_session(model, input)?
        };

        if raw.is_empty() {
            return Err(ModelError::EmptyOutput(self.name.clone()));
        }
        if !all_finite(&raw) {
            return Err(ModelError::NonFinite(self.name.clone()));
        }
        if raw.len() != self.labels.len() {
            warn!(
                model = %self.name,
                outputs = raw.len(),
                labels = self.labels.len(),
                "Model output does not match labels"
            );
            return Err(ModelError::LabelMismatch {
                model: self.name.clone(),
                outputs: raw.len(),
                labels: self.labels.len(),
            });
        }

        Ok(to_probabilities(&raw))
    }
}

/// Interpret raw model output as probabilities.
///
/// Outputs that already form a distribution are returned unchanged,
/// anything else is treated as logits and softmaxed.
pub fn to_probabilities(raw: &[f32]) -> Vec<f32> {
    let in_range = raw.iter().all(|v| (0.0..=1.0).contains(v));
    let sum: f32 = raw.iter().sum();
    if in_range && (sum - 1.0).abs() < 1e-3 {
        return raw.to_vec();
    }

    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / total).collect()
}

/// True when no score is NaN or infinite
pub fn all_finite(scores: &[f32]) -> bool {
    scores.iter().all(|v| v.is_finite())
}

/// Index and probability of the most likely class; the first wins ties.
pub fn top_class(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((idx, p)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probabilities_pass_through() {
        let probs = to_probabilities(&[0.2, 0.8]);
        assert_eq!(probs, vec![0.2, 0.8]);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let probs = to_probabilities(&[2.0, 0.0, -1.0]);
        let sum: f32 = probs.iter().sum();

        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
        assert!((probs[0] - 0.8438).abs() < 1e-3);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probs = to_probabilities(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!((probs[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[0.0, -3.5, 12.0]));
        assert!(!all_finite(&[0.1, f32::NAN]));
        assert!(!all_finite(&[f32::INFINITY, 0.0]));
        assert!(!all_finite(&[f32::NEG_INFINITY]));
    }

    #[test]
    fn test_top_class() {
        assert_eq!(top_class(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(top_class(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(top_class(&[]), None);
    }
}
