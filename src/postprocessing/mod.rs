//! Image enrichment: labels, thumbnails and record updates

pub mod processor;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use processor::{ContentProcessor, ProcessedImage, ProcessingError};
pub use watcher::run_insert_listener;
