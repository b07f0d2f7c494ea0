//! Configuration management for the classifier and postprocessing services

use crate::services::thumbnail::ThumbnailFormat;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the optional TOML configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "GENAI_CONFIG";

/// Flat environment variables understood for compatibility with existing deployments.
/// Each maps onto a key of the layered configuration.
const LEGACY_ENV_KEYS: [(&str, &str); 6] = [
    ("GOOGLE_VISION_API_KEY", "vision.api_key"),
    ("CONTENT_DB_URI", "database.uri"),
    ("MINIO_ENDPOINT", "storage.endpoint"),
    ("MINIO_PORT", "storage.port"),
    ("MINIO_ACCESS_KEY", "storage.access_key"),
    ("MINIO_SECRET_KEY", "storage.secret_key"),
];

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
    pub postprocessing: PostprocessingConfig,
    pub thumbnail: ThumbnailConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub vision: VisionConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding a listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Image classifier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Directory scanned for `*.onnx` models at startup
    pub models_dir: String,
    /// Model used by `POST /prediction`
    pub default_model: String,
    /// Side length of the square model input
    pub input_size: u32,
    /// Accepted upload extensions (lowercase, without dot)
    pub allowed_extensions: Vec<String>,
    /// Intra-op threads per ONNX session
    pub onnx_threads: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
            default_model: "resnet34_image_classifier_v4".to_string(),
            input_size: 224,
            allowed_extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            onnx_threads: 1,
        }
    }
}

/// Postprocessing pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostprocessingConfig {
    /// Bucket holding the source images
    pub images_bucket: String,
    /// Bucket receiving generated thumbnails
    pub thumbnails_bucket: String,
    /// Also process images as soon as they are inserted into the document store
    pub watch_inserts: bool,
    /// Maximum concurrent runs started by the insert watcher
    pub workers: usize,
}

impl Default for PostprocessingConfig {
    fn default() -> Self {
        Self {
            images_bucket: "genai-images".to_string(),
            thumbnails_bucket: "genai-thumbnails".to_string(),
            watch_inserts: false,
            workers: 4,
        }
    }
}

/// Thumbnail generation parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub format: ThumbnailFormat,
    /// Encoder quality (0-100), ignored by lossless formats
    pub quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: 512,
            max_height: 512,
            format: ThumbnailFormat::WebP,
            quality: 75,
        }
    }
}

/// S3-compatible object storage (MinIO) connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Host name, without scheme or port
    pub endpoint: String,
    pub port: u16,
    pub access_key: String,
    pub secret_key: String,
    /// Use HTTPS
    pub secure: bool,
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost".to_string(),
            port: 9000,
            access_key: String::new(),
            secret_key: String::new(),
            secure: false,
            region: "us-east-1".to_string(),
        }
    }
}

impl StorageConfig {
    /// Full endpoint URL including scheme and port
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.endpoint, self.port)
    }
}

/// Document store connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "content".to_string(),
            collection: "aigeneratedimages".to_string(),
        }
    }
}

/// Label annotation API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub api_key: String,
    pub endpoint: String,
    /// Upper bound on labels requested per image, API default when unset
    pub max_results: Option<u32>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            max_results: None,
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries, 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 300,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file location and the environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific (optional) file plus the environment
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("GENAI")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_KEYS {
            builder = builder
                .set_override_option(key, std::env::var(var).ok())
                .context(format!("Invalid value in {}", var))?;
        }

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.classifier.default_model, "resnet34_image_classifier_v4");
        assert_eq!(config.classifier.input_size, 224);
        assert_eq!(config.classifier.allowed_extensions.len(), 4);
        assert_eq!(config.postprocessing.images_bucket, "genai-images");
        assert_eq!(config.postprocessing.thumbnails_bucket, "genai-thumbnails");
        assert_eq!(config.thumbnail.max_width, 512);
        assert_eq!(config.thumbnail.quality, 75);
        assert_eq!(config.thumbnail.format, ThumbnailFormat::WebP);
        assert_eq!(config.database.collection, "aigeneratedimages");
    }

    #[test]
    fn test_storage_endpoint_url() {
        let mut storage = StorageConfig {
            endpoint: "minio".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(storage.endpoint_url(), "http://minio:9000");

        storage.secure = true;
        assert_eq!(storage.endpoint_url(), "https://minio:9000");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 8080\n\n[thumbnail]\nformat = \"jpeg\"\nquality = 90\n"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.thumbnail.format, ThumbnailFormat::Jpeg);
        assert_eq!(config.thumbnail.quality, 90);
        assert_eq!(config.thumbnail.max_height, 512);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.classifier.models_dir, "models");
    }
}
