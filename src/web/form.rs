//! # Upload Form
//!
//! Decodes a `multipart/form-data` body and validates its single `image` file field.
//! The file is streamed chunk by chunk into a staging file inside the media root and
//! only kept under its final `<uuid>_<filename>` name once it passes validation.

use std::fmt;
use std::path::PathBuf;

use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use multer::{Constraints, Multipart, SizeLimit};
use tracing::debug;

use crate::errors::{error_logging, AppError};
use crate::storage::{MediaStore, UploadWriter};

/// Name of the file field on the upload form
pub const IMAGE_FIELD: &str = "image";

/// Why an upload was rejected by form validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    /// Not a multipart body, missing boundary, or a malformed stream
    NotMultipart,
    /// No `image` field, or the field carried no filename
    Missing,
    /// The file has no content
    Empty,
    /// The request body exceeded the configured limit
    TooLarge { limit: u64 },
    /// The leading bytes do not match any known image format
    InvalidImage,
}

impl UploadRejection {
    /// Short label used in metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            UploadRejection::NotMultipart => "not_multipart",
            UploadRejection::Missing => "missing",
            UploadRejection::Empty => "empty",
            UploadRejection::TooLarge { .. } => "too_large",
            UploadRejection::InvalidImage => "invalid_image",
        }
    }
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRejection::NotMultipart => write!(
                f,
                "The submitted data was not a file. Check the encoding type on the form."
            ),
            UploadRejection::Missing => write!(f, "This field is required."),
            UploadRejection::Empty => write!(f, "The submitted file is empty."),
            UploadRejection::TooLarge { limit } => {
                write!(f, "Ensure this file is smaller than {} bytes.", limit)
            }
            UploadRejection::InvalidImage => write!(
                f,
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image."
            ),
        }
    }
}

impl From<UploadRejection> for AppError {
    fn from(rejection: UploadRejection) -> Self {
        AppError::Validation(rejection.to_string())
    }
}

/// Failure while reading the upload form
#[derive(Debug)]
pub enum UploadError {
    /// The form is invalid; re-render it with a field error
    Rejected(UploadRejection),
    /// The upload could not be written
    Failed(AppError),
}

impl From<UploadRejection> for UploadError {
    fn from(rejection: UploadRejection) -> Self {
        UploadError::Rejected(rejection)
    }
}

impl From<AppError> for UploadError {
    fn from(error: AppError) -> Self {
        UploadError::Failed(error)
    }
}

/// An accepted upload stored in the media root
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Filename as sent by the client
    pub original_name: String,
    /// `<uuid>_<sanitized basename>`
    pub filename: String,
    /// Location inside the media root
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: image::ImageFormat,
}

/// Read the `image` field of a multipart request into the media store.
///
/// The first `image` field carrying a filename is used; other fields are skipped.
/// Rejected uploads leave no file behind.
pub async fn read_upload<B>(
    content_type: Option<&str>,
    body: B,
    store: &MediaStore,
    max_bytes: u64,
) -> Result<StoredUpload, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let boundary = content_type
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or(UploadRejection::NotMultipart)?;

    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(max_bytes));
    let mut multipart =
        Multipart::with_constraints(body.into_data_stream(), boundary, constraints);

    let limit_or_malformed = |e: multer::Error| -> UploadRejection {
        match e {
            multer::Error::StreamSizeExceeded { limit }
            | multer::Error::FieldSizeExceeded { limit, .. } => {
                UploadRejection::TooLarge { limit }
            }
            other => {
                debug!(error = %other, "Malformed multipart body");
                UploadRejection::NotMultipart
            }
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(limit_or_malformed)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let original_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        let mut writer = store.begin_upload(&original_name)?;
        while let Some(chunk) = field.chunk().await.map_err(limit_or_malformed)? {
            writer.write_chunk(&chunk)?;
        }

        return accept(writer);
    }

    Err(UploadRejection::Missing.into())
}

/// Validate a fully written upload and keep it under its final name
fn accept(writer: UploadWriter) -> Result<StoredUpload, UploadError> {
    let size_bytes = writer.bytes_written();
    if size_bytes == 0 {
        return Err(reject(&writer, UploadRejection::Empty));
    }

    let Some(format) = writer.detected_format() else {
        return Err(reject(&writer, UploadRejection::InvalidImage));
    };

    let original_name = writer.original_name().to_string();
    let (filename, path) = writer.persist()?;

    Ok(StoredUpload {
        original_name,
        filename,
        path,
        size_bytes,
        format,
    })
}

fn reject(writer: &UploadWriter, rejection: UploadRejection) -> UploadError {
    error_logging::log_validation_error(
        &rejection,
        "validate_upload",
        IMAGE_FIELD,
        Some(writer.original_name()),
    );
    UploadError::Rejected(rejection)
}
