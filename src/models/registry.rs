//! Immutable model registry shared by request handlers

use crate::config::ClassifierConfig;
use crate::models::inference::{all_finite, top_class, Classifier, ModelError, OnnxClassifier};
use crate::models::loader::ModelLoader;
use crate::preprocess::{ImageTensorizer, PreprocessError};
use crate::types::Prediction;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Why a prediction could not be produced
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Model \"{0}\" not found")]
    UnknownModel(String),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Prediction plus the time spent in the model
#[derive(Debug, Clone)]
pub struct TimedPrediction {
    pub prediction: Prediction,
    pub inference_time: Duration,
}

/// Model name → classifier, fixed after construction.
///
/// Built once at startup and handed to handlers behind an `Arc`.
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Classifier>>,
    default_model: String,
    tensorizer: ImageTensorizer,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new(default_model: impl Into<String>, tensorizer: ImageTensorizer) -> Self {
        Self {
            models: HashMap::new(),
            default_model: default_model.into(),
            tensorizer,
        }
    }

    /// Add a classifier under a name, replacing any previous one
    pub fn with_model(mut self, name: impl Into<String>, classifier: Arc<dyn Classifier>) -> Self {
        self.models.insert(name.into(), classifier);
        self
    }

    /// Load every ONNX model from the configured directory.
    ///
    /// Fails if any model fails to load or the default model is missing.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let loader = ModelLoader::with_threads(config.onnx_threads)?;
        let mut registry = Self::new(
            config.default_model.clone(),
            ImageTensorizer::new(config.input_size),
        );

        for model in loader.load_all_models(&config.models_dir)? {
            let classifier = OnnxClassifier::new(model);
            let name = classifier.name().to_string();
            registry = registry.with_model(name, Arc::new(classifier));
        }

        if !registry.contains(&config.default_model) {
            bail!(
                "Default model \"{}\" not found in {} (available: {:?})",
                config.default_model,
                config.models_dir,
                registry.model_names()
            );
        }

        info!(
            default_model = %registry.default_model,
            models = ?registry.model_names(),
            "Model registry ready"
        );

        Ok(registry)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Classifier>> {
        self.models.get(name)
    }

    /// Loaded model names, sorted
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Classify raw image bytes with the named model.
    ///
    /// CPU bound; call from a blocking context.
    pub fn predict(&self, model_name: &str, image: &[u8]) -> Result<TimedPrediction, PredictError> {
        let classifier = self
            .get(model_name)
            .ok_or_else(|| PredictError::UnknownModel(model_name.to_string()))?;

        let input = self.tensorizer.tensorize(image)?;

        let start = Instant::now();
        let probabilities = classifier.probabilities(&input)?;
        let inference_time = start.elapsed();

        if !all_finite(&probabilities) {
            return Err(ModelError::NonFinite(model_name.to_string()).into());
        }
        let (idx, confidence) = top_class(&probabilities)
            .ok_or_else(|| ModelError::EmptyOutput(model_name.to_string()))?;
        let label = classifier
            .labels()
            .get(idx)
            .cloned()
            .ok_or_else(|| ModelError::LabelMismatch {
                model: model_name.to_string(),
                outputs: probabilities.len(),
                labels: classifier.labels().len(),
            })?;

        debug!(
            model = %model_name,
            label = %label,
            confidence = confidence,
            inference_time_us = inference_time.as_micros(),
            "Prediction complete"
        );

        Ok(TimedPrediction {
            prediction: Prediction::new(label, model_name, confidence),
            inference_time,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::preprocess::ImageTensor;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    /// Classifier that scores by mean input value, so equal inputs give equal outputs
    pub(crate) struct BrightnessClassifier {
        labels: Vec<String>,
    }

    impl BrightnessClassifier {
        pub(crate) fn new() -> Self {
            Self {
                labels: vec!["dark".to_string(), "bright".to_string()],
            }
        }
    }

    impl Classifier for BrightnessClassifier {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn probabilities(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
            let mean = input.data.iter().sum::<f32>() / input.data.len() as f32;
            Ok(crate::models::inference::to_probabilities(&[-mean, mean]))
        }
    }

    /// Classifier that ignores its input and returns a fixed result
    pub(crate) struct FixedOutputClassifier {
        labels: Vec<String>,
        /// `None` fails every call
        scores: Option<Vec<f32>>,
    }

    impl FixedOutputClassifier {
        pub(crate) fn scores(scores: Vec<f32>) -> Self {
            Self {
                labels: vec!["first".to_string(), "second".to_string()],
                scores: Some(scores),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                labels: vec!["first".to_string(), "second".to_string()],
                scores: None,
            }
        }
    }

    impl Classifier for FixedOutputClassifier {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn probabilities(&self, _input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
            self.scores
                .clone()
                .ok_or_else(|| ModelError::EmptyOutput("broken".to_string()))
        }
    }

    pub(crate) fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(32, 32, Rgb(color));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub(crate) fn test_registry() -> ModelRegistry {
        ModelRegistry::new("brightness", ImageTensorizer::new(16))
            .with_model("brightness", Arc::new(BrightnessClassifier::new()))
            .with_model("broken", Arc::new(FixedOutputClassifier::failing()))
            .with_model(
                "nan",
                Arc::new(FixedOutputClassifier::scores(vec![f32::NAN, 0.5])),
            )
    }

    #[test]
    fn test_registry_lookup() {
        let registry = test_registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("brightness"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.default_model(), "brightness");
        assert_eq!(registry.model_names(), vec!["brightness", "broken", "nan"]);
    }

    #[test]
    fn test_predict_labels_and_model() {
        let registry = test_registry();

        let bright = registry.predict("brightness", &png_bytes([250, 250, 250])).unwrap();
        assert_eq!(bright.prediction.label, "bright");
        assert_eq!(bright.prediction.model, "brightness");
        assert!(bright.prediction.confidence > 0.5 && bright.prediction.confidence <= 1.0);

        let dark = registry.predict("brightness", &png_bytes([5, 5, 5])).unwrap();
        assert_eq!(dark.prediction.label, "dark");
    }

    #[test]
    fn test_predict_is_deterministic() {
        let registry = test_registry();
        let bytes = png_bytes([90, 140, 200]);

        let first = registry.predict("brightness", &bytes).unwrap();
        let second = registry.predict("brightness", &bytes).unwrap();

        assert_eq!(first.prediction, second.prediction);
    }

    #[test]
    fn test_unknown_model() {
        let registry = test_registry();
        let err = registry.predict("nope", &png_bytes([0, 0, 0])).unwrap_err();

        assert!(matches!(err, PredictError::UnknownModel(_)));
        assert_eq!(err.to_string(), "Model \"nope\" not found");
    }

    #[test]
    fn test_undecodable_image() {
        let registry = test_registry();
        let err = registry.predict("brightness", b"garbage").unwrap_err();
        assert!(matches!(err, PredictError::Preprocess(_)));
    }

    #[test]
    fn test_model_failure() {
        let registry = test_registry();
        let err = registry.predict("broken", &png_bytes([0, 0, 0])).unwrap_err();
        assert!(matches!(err, PredictError::Model(ModelError::EmptyOutput(_))));
    }

    #[test]
    fn test_non_finite_scores_are_rejected() {
        let registry = test_registry();
        let err = registry.predict("nan", &png_bytes([0, 0, 0])).unwrap_err();
        assert!(matches!(err, PredictError::Model(ModelError::NonFinite(_))));
    }
}
