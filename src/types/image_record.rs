//! Image record as stored in the content database

use serde::{Deserialize, Serialize};

/// The subset of an AI-generated image document that postprocessing reads and writes.
///
/// The record is created and deleted elsewhere; postprocessing only ever
/// touches `contentTags` and `thumbnailKey`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Location of the raw image in the source bucket
    #[serde(default)]
    pub storage_key: Option<String>,

    /// Accumulated descriptive labels (a set, order of first insertion)
    #[serde(default)]
    pub content_tags: Vec<String>,

    /// Location of the generated thumbnail in the thumbnail bucket
    #[serde(default)]
    pub thumbnail_key: Option<String>,
}

impl ImageRecord {
    /// Create a record pointing at a raw image
    pub fn with_storage_key(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: Some(storage_key.into()),
            ..Default::default()
        }
    }

    /// Merge tags into the record, skipping any already present
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref();
            if !self.content_tags.iter().any(|existing| existing == tag) {
                self.content_tags.push(tag.to_string());
            }
        }
    }
}
