//! # Shared Types for Image Preprocessing

use image::GrayImage;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone)]
pub enum PreprocessingError {
    /// The image has no pixels to threshold
    EmptyImage { width: u32, height: u32 },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::EmptyImage { width, height } => {
                write!(f, "Cannot threshold an empty image ({}x{})", width, height)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Result of image thresholding operation.
#[derive(Debug, Clone)]
pub struct ThresholdedImageResult {
    /// Binary mask: 255 for foreground (dark grains), 0 for background
    pub mask: GrayImage,
    /// Threshold value found by Otsu's method
    pub threshold: u8,
    /// Number of foreground pixels in the mask
    pub foreground_pixels: u64,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}
