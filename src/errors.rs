//! # Application Error Types
//!
//! This module defines the closed set of error kinds used throughout the rice inspector.
//! Each kind maps to a distinct presentation on the upload page, so callers match on
//! the variant instead of inspecting message strings.

use std::fmt;
use std::path::PathBuf;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Upload form validation errors (missing field, empty file, not an image)
    Validation(String),
    /// The stored file could not be decoded as an image
    Load {
        /// Path that failed to decode
        path: PathBuf,
        /// Decoder or I/O message
        reason: String,
    },
    /// Media root, upload or annotated output could not be written
    Storage(String),
    /// Internal application errors
    Internal(String),
}

impl AppError {
    /// Build a load error for the given path
    pub fn load(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        AppError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short, stable name of the error kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Validation(_) => "validation",
            AppError::Load { .. } => "load",
            AppError::Storage(_) => "storage",
            AppError::Internal(_) => "internal",
        }
    }
}

impl AppError {
    /// Message without the kind prefix, for showing to the person who uploaded
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(msg)
            | AppError::Validation(msg)
            | AppError::Storage(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Load { path, reason } => {
                format!("Could not read image: {} ({})", path.display(), reason)
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Load { path, reason } => {
                write!(
                    f,
                    "[LOAD] Could not read image: {} ({})",
                    path.display(),
                    reason
                )
            }
            AppError::Storage(msg) => write!(f, "[STORAGE] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<crate::preprocessing::PreprocessingError> for AppError {
    fn from(err: crate::preprocessing::PreprocessingError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log classifier failures with the image path and processing context
    pub fn log_classification_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image_path: Option<&str>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image_path = ?image_path,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Grain classification failed"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_filesystem_error(
        error: &impl std::fmt::Display,
        operation: &str,
        path: Option<&str>,
        file_size: Option<u64>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            path = ?path,
            file_size_bytes = ?file_size,
            "File system operation failed"
        );
    }

    /// Log upload validation failures with input context
    pub fn log_validation_error(
        error: &impl std::fmt::Display,
        operation: &str,
        field: &str,
        filename: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            field = %field,
            filename = ?filename.map(truncate_for_log),
            "Validation failed"
        );
    }

    /// First 100 characters of client-supplied text, marked when cut
    fn truncate_for_log(value: &str) -> String {
        if value.chars().count() > 100 {
            format!("{}...", value.chars().take(100).collect::<String>())
        } else {
            value.to_string()
        }
    }

    /// Log network/connection errors from the HTTP servers
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        peer: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            peer = ?peer,
            "Network operation failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
