//! Image records in the content database (MongoDB)

use crate::config::DatabaseConfig;
use crate::types::ImageRecord;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::{Client, Collection};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by a document store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid image id \"{0}\"")]
    InvalidId(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

/// Read/update access to image records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a record, `None` when no record has that id
    async fn find_image(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError>;

    /// Add tags to the record's tag set, ignoring those already present
    async fn add_content_tags(&self, image_id: &str, tags: &[String]) -> Result<(), StoreError>;

    /// Point the record at its thumbnail
    async fn set_thumbnail_key(&self, image_id: &str, key: &str) -> Result<(), StoreError>;
}

/// `aigeneratedimages` collection accessor
#[derive(Clone)]
pub struct MongoImageStore {
    collection: Collection<Document>,
}

impl MongoImageStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.uri).await?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to content database"
        );

        Ok(Self { collection })
    }

    /// Ids of records inserted from now on.
    ///
    /// Backed by a change stream, which requires a replica set.
    pub async fn watch_inserts(&self) -> Result<BoxStream<'static, String>, StoreError> {
        let stream = self
            .collection
            .watch()
            .pipeline(vec![doc! { "$match": { "operationType": "insert" } }])
            .await?;

        info!("Watching content database for inserted images");

        let ids = stream.filter_map(|event| async move {
            match event {
                Ok(event) => event
                    .document_key
                    .and_then(|key| key.get_object_id("_id").ok())
                    .map(|id| id.to_hex()),
                Err(e) => {
                    warn!(error = %e, "Change stream error");
                    None
                }
            }
        });

        Ok(ids.boxed())
    }
}

fn parse_id(image_id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(image_id).map_err(|_| StoreError::InvalidId(image_id.to_string()))
}

#[async_trait]
impl DocumentStore for MongoImageStore {
    async fn find_image(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        let id = parse_id(image_id)?;

        let document = self
            .collection
            .find_one(doc! { "_id": id })
            .projection(doc! { "storageKey": 1, "contentTags": 1, "thumbnailKey": 1 })
            .await?;

        let record = document.map(|doc| ImageRecord {
            storage_key: doc.get_str("storageKey").ok().map(str::to_string),
            content_tags: doc
                .get_array("contentTags")
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            thumbnail_key: doc.get_str("thumbnailKey").ok().map(str::to_string),
        });

        Ok(record)
    }

    async fn add_content_tags(&self, image_id: &str, tags: &[String]) -> Result<(), StoreError> {
        let id = parse_id(image_id)?;

        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$addToSet": { "contentTags": { "$each": tags.to_vec() } } },
            )
            .await?;

        debug!(image_id = %image_id, modified = result.modified_count, "Updated content tags");
        Ok(())
    }

    async fn set_thumbnail_key(&self, image_id: &str, key: &str) -> Result<(), StoreError> {
        let id = parse_id(image_id)?;

        let result = self
            .collection
            .update_one(doc! { "_id": id }, doc! { "$set": { "thumbnailKey": key } })
            .await?;

        debug!(image_id = %image_id, modified = result.modified_count, "Updated thumbnail key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = ObjectId::new();
        assert_eq!(parse_id(&id.to_hex()).unwrap(), id);

        let err = parse_id("abc123").unwrap_err();
        assert_eq!(err.to_string(), "Invalid image id \"abc123\"");
    }
}
