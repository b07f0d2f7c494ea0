//! S3-compatible object storage (MinIO)

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by an object store
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("Failed to get {bucket}/{key}: {message}")]
    Get {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to put {bucket}/{key}: {message}")]
    Put {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Blob storage addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Create or overwrite an object
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;
}

/// Object store backed by the AWS SDK, pointed at a MinIO endpoint
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Build a path-style client with static credentials
    pub async fn connect(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(endpoint = %config.endpoint_url(), "Object storage client configured");

        Self {
            client: S3Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let get_error = |message: String| ObjectStoreError::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| get_error(e.to_string()))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| get_error(e.to_string()))?
            .into_bytes()
            .to_vec();

        debug!(bucket = %bucket, key = %key, size = data.len(), "Fetched object");
        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let size = data.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        debug!(bucket = %bucket, key = %key, size = size, "Stored object");
        Ok(())
    }
}
