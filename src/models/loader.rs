//! ONNX model loader

use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File extension of loadable model artifacts
pub const MODEL_EXTENSION: &str = "onnx";

/// Suffix of the sidecar file holding class names for a model
pub const LABELS_SUFFIX: &str = ".labels.json";

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name (file stem)
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for class scores
    pub output_name: String,
    /// Class names, indexed like the model output
    pub labels: Vec<String>,
}

/// Loader for ONNX classifiers
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model and its labels
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let labels = read_labels(&labels_path(path))?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("logits"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            classes = labels.len(),
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
            labels,
        })
    }

    /// Load every model found in a directory.
    ///
    /// Any model that fails to load aborts the whole load, as does a
    /// directory without models.
    pub fn load_all_models<P: AsRef<Path>>(&self, models_dir: P) -> Result<Vec<LoadedModel>> {
        let models_dir = models_dir.as_ref();
        let mut models = Vec::new();

        for (name, path) in discover_models(models_dir)? {
            let model = self
                .load_model(&path, &name)
                .with_context(|| format!("Failed to load model {}", name))?;
            models.push(model);
        }

        if models.is_empty() {
            bail!("No models loaded from {}", models_dir.display());
        }

        info!(
            count = models.len(),
            "Loaded {} models from {}",
            models.len(),
            models_dir.display()
        );

        Ok(models)
    }
}

/// List `(name, path)` of every model artifact in a directory, sorted by name.
pub fn discover_models(models_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(models_dir)
        .with_context(|| format!("Failed to read models directory {}", models_dir.display()))?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_model = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(MODEL_EXTENSION));
        if !is_model {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            found.push((name.to_string(), path.clone()));
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Path of the labels sidecar for a model file
pub fn labels_path(model_path: &Path) -> PathBuf {
    let stem = model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    model_path.with_file_name(format!("{}{}", stem, LABELS_SUFFIX))
}

/// Read a JSON array of class names
pub fn read_labels(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels from {}", path.display()))?;
    let labels: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse labels in {}", path.display()))?;

    if labels.is_empty() {
        bail!("Labels file {} is empty", path.display());
    }

    Ok(labels)
}
