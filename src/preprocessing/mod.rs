//! # Image Preprocessing Module
//!
//! Turns a decoded color image into the binary mask the contour pass works on.
//!
//! The module is organized into focused sub-modules:
//! - `thresholding`: Inverted binary thresholding using Otsu's method
//! - `types`: Shared types and error definitions

pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use thresholding::{
    apply_inverted_otsu_threshold, find_otsu_threshold, grayscale_histogram, to_grayscale_bt601,
};
pub use types::{PreprocessingError, ThresholdedImageResult};
