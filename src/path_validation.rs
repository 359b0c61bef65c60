//! Path Validation module for secure media file naming
//!
//! Uploaded filenames come straight from the client and end up as part of a path
//! inside the media root, and media names come straight from request URLs. This
//! module keeps both from escaping the media root:
//!
//! - Client filenames are reduced to their last path component (both `/` and `\`
//!   separators) and sanitized
//! - Media names requested over HTTP must be a single, valid filename
//! - Null bytes, control characters, reserved device names and overlong names are
//!   rejected
//!
//! ## Usage Examples
//!
//! ```rust
//! use rice_inspector::path_validation::{sanitize_filename, upload_basename};
//!
//! assert_eq!(upload_basename("C:\\Users\\me\\grains.jpg"), "grains.jpg");
//! assert_eq!(sanitize_filename("unsafe<name>.jpg"), "unsafe_name_.jpg");
//! ```

use std::path::{Component, Path};

/// Errors that can occur during path validation
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    /// Path contains dangerous traversal sequences (..)
    PathTraversal,
    /// Path contains null bytes
    NullByte,
    /// Name contains a directory separator
    NotAFilename,
    /// Path contains invalid characters
    InvalidCharacters,
    /// Filename is too long
    FilenameTooLong,
    /// Filename uses reserved name
    ReservedName,
    /// Empty path provided
    EmptyPath,
}

/// Result type for path validation operations
pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum allowed filename length (255 bytes on most filesystems)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Reserved filenames that should not be used (Windows compatibility)
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters that are not allowed in filenames
pub const FORBIDDEN_FILENAME_CHARS: &[char] = &[
    '<', '>', ':', '"', '|', '?', '*', '\0', // null byte
    '\x01', '\x02', '\x03', '\x04', '\x05', '\x06', '\x07', // control chars
    '\x08', '\x09', '\x0a', '\x0b', '\x0c', '\x0d', '\x0e', '\x0f', // control chars
    '\x10', '\x11', '\x12', '\x13', '\x14', '\x15', '\x16', '\x17', // control chars
    '\x18', '\x19', '\x1a', '\x1b', '\x1c', '\x1d', '\x1e', '\x1f', // control chars
];

/// Last path component of a client-supplied filename.
///
/// Browsers on Windows may send full paths with backslashes, so both separators are
/// honored regardless of the host platform.
pub fn upload_basename(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Validate a name used to look up a file directly inside the media root.
///
/// The name must be a single normal path component that also passes
/// [`validate_filename`].
pub fn validate_media_filename(name: &str) -> PathValidationResult<()> {
    if name.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }
    if name.contains('\0') {
        return Err(PathValidationError::NullByte);
    }
    if contains_path_traversal(name) {
        return Err(PathValidationError::PathTraversal);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(PathValidationError::NotAFilename);
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(PathValidationError::NotAFilename),
    }

    validate_filename(name)
}

/// Check if a path contains path traversal sequences
///
/// Detects `..` components and URL-encoded traversal.
fn contains_path_traversal(path: &str) -> bool {
    if path.contains("..") {
        let parent_component = Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if parent_component || path == ".." {
            return true;
        }
    }

    let lowered = path.to_ascii_lowercase();
    lowered.contains("%2e%2e") || lowered.contains("%2f") || lowered.contains("%5c")
}

/// Validate a filename for security issues
pub fn validate_filename(filename: &str) -> PathValidationResult<()> {
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(PathValidationError::FilenameTooLong);
    }

    if filename.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    // Reserved names are matched case-insensitively on the part before the first dot
    let filename_upper = filename.to_uppercase();
    let name_without_ext = filename_upper.split('.').next().unwrap_or("");

    if RESERVED_NAMES.contains(&name_without_ext) {
        return Err(PathValidationError::ReservedName);
    }

    if filename
        .chars()
        .any(|c| FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control())
    {
        return Err(PathValidationError::InvalidCharacters);
    }

    Ok(())
}

/// Sanitize a filename by removing or replacing dangerous characters
///
/// Forbidden characters and separators become underscores, surrounding whitespace and
/// dots are trimmed, reserved device names get a leading underscore, and overlong
/// names are cut while preserving the extension.
///
/// # Examples
///
/// ```rust
/// use rice_inspector::path_validation::sanitize_filename;
///
/// assert_eq!(sanitize_filename("safe_file.jpg"), "safe_file.jpg");
/// assert_eq!(sanitize_filename("unsafe<name>.jpg"), "unsafe_name_.jpg");
/// assert_eq!(sanitize_filename("file with spaces.jpg"), "file with spaces.jpg");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized: String = filename
        .chars()
        .map(|c| {
            if FORBIDDEN_FILENAME_CHARS.contains(&c) || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    sanitized = sanitized.trim().trim_matches('.').trim().to_string();
    if sanitized.is_empty() {
        sanitized = "unnamed_file".to_string();
    }

    let stem_upper = sanitized
        .split('.')
        .next()
        .unwrap_or("")
        .to_uppercase();
    if RESERVED_NAMES.contains(&stem_upper.as_str()) {
        sanitized.insert(0, '_');
    }

    // Leave room for the "<uuid>_" prefix added by the media store
    let max_len = MAX_FILENAME_LENGTH - 37;
    if sanitized.len() > max_len {
        sanitized = truncate_preserving_extension(&sanitized, max_len);
    }

    sanitized
}

fn truncate_preserving_extension(name: &str, max_len: usize) -> String {
    let floor = |s: &str, limit: usize| -> usize {
        let mut end = limit.min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        end
    };

    match name.rfind('.') {
        Some(dot_pos) if name.len() - dot_pos < max_len => {
            let (stem, ext) = name.split_at(dot_pos);
            let keep = floor(stem, max_len - ext.len());
            format!("{}{}", &stem[..keep], ext)
        }
        _ => name[..floor(name, max_len)].to_string(),
    }
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::PathTraversal => {
                write!(f, "Path contains directory traversal sequences")
            }
            PathValidationError::NullByte => write!(f, "Path contains null bytes"),
            PathValidationError::NotAFilename => write!(f, "Name must be a single filename"),
            PathValidationError::InvalidCharacters => write!(f, "Path contains invalid characters"),
            PathValidationError::FilenameTooLong => write!(f, "Filename is too long"),
            PathValidationError::ReservedName => write!(f, "Filename uses reserved name"),
            PathValidationError::EmptyPath => write!(f, "Path is empty"),
        }
    }
}

impl std::error::Error for PathValidationError {}
