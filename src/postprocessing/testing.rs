//! In-memory collaborators for postprocessing tests

use super::ContentProcessor;
use crate::services::{
    DocumentStore, LabelAnnotator, LabelingError, ObjectStore, ObjectStoreError, StoreError,
    ThumbnailGenerator,
};
use crate::types::ImageRecord;
use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct MemoryDocumentStore {
    records: Mutex<HashMap<String, ImageRecord>>,
    pub(crate) lookups: AtomicUsize,
}

impl MemoryDocumentStore {
    pub(crate) fn insert(&self, id: &str, record: ImageRecord) {
        self.records.lock().unwrap().insert(id.to_string(), record);
    }

    pub(crate) fn get(&self, id: &str) -> Option<ImageRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_image(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(image_id))
    }

    async fn add_content_tags(&self, image_id: &str, tags: &[String]) -> Result<(), StoreError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(image_id) {
            record.add_tags(tags);
        }
        Ok(())
    }

    async fn set_thumbnail_key(&self, image_id: &str, key: &str) -> Result<(), StoreError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(image_id) {
            record.thumbnail_key = Some(key.to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    read_only: bool,
    pub(crate) gets: AtomicUsize,
    pub(crate) puts: AtomicUsize,
}

impl MemoryObjectStore {
    /// A store that rejects every write
    pub(crate) fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub(crate) fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
    }

    pub(crate) fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.get(bucket, key).ok_or_else(|| ObjectStoreError::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: "NoSuchKey".to_string(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if self.read_only {
            return Err(ObjectStoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "AccessDenied".to_string(),
            });
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.insert(bucket, key, data);
        Ok(())
    }
}

/// Labeler returning a fixed answer
pub(crate) struct StaticLabeler {
    labels: Vec<String>,
    fail: bool,
    pub(crate) calls: AtomicUsize,
}

impl StaticLabeler {
    pub(crate) fn new(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }
}

#[async_trait]
impl LabelAnnotator for StaticLabeler {
    async fn labels(&self, _image_data: &[u8]) -> Result<Vec<String>, LabelingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LabelingError::Status {
                status: 403,
                body: "API key not valid".to_string(),
            });
        }
        Ok(self.labels.clone())
    }
}

pub(crate) fn processor_with(
    documents: Arc<MemoryDocumentStore>,
    objects: Arc<MemoryObjectStore>,
    labeler: Arc<StaticLabeler>,
) -> ContentProcessor {
    ContentProcessor::new(documents, objects, labeler, ThumbnailGenerator::default())
}

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}
