//! Type definitions shared by the classifier and postprocessing services

pub mod image_record;
pub mod prediction;

pub use image_record::ImageRecord;
pub use prediction::Prediction;
