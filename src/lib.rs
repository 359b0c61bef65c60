//! # Rice Inspector
//!
//! A small web service that accepts a photograph of rice grains, segments the
//! grains with an inverted Otsu threshold and external contours, and returns a copy
//! of the image with every grain boxed: red when broken (a short bounding box side),
//! green when intact.

pub mod classifier;
pub mod config;
pub mod contours;
pub mod errors;
pub mod observability;
pub mod observability_config;
pub mod path_validation;
pub mod preprocessing;
pub mod storage;
pub mod web;

// Re-export types for easier access
pub use classifier::{ClassificationReport, GrainClassifier, GrainLabel};
pub use config::AppConfig;
pub use errors::{AppError, AppResult};
pub use storage::{MediaStore, RetentionPolicy};
