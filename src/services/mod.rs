//! External collaborators used by the postprocessing pipeline

pub mod document_store;
pub mod labeling;
pub mod object_store;
pub mod thumbnail;

pub use document_store::{DocumentStore, MongoImageStore, StoreError};
pub use labeling::{LabelAnnotator, LabelingError, VisionLabelAnnotator};
pub use object_store::{ObjectStore, ObjectStoreError, S3ObjectStore};
pub use thumbnail::{Thumbnail, ThumbnailError, ThumbnailFormat, ThumbnailGenerator};
