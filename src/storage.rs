//! # Media Storage
//!
//! Everything the service writes lives flat inside a single media root:
//!
//! - uploads, named `<uuid>_<original filename>`
//! - annotated results, named `<uuid>.jpg`
//!
//! Uploads are staged in a hidden temp file inside the root and moved to their final
//! name only once the form layer accepts them, so rejected uploads leave nothing
//! behind. Final names are never overwritten.
//!
//! Nothing is deleted on the request path. Cleanup is governed by an explicit
//! [`RetentionPolicy`] applied by a periodic sweeper.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::errors::{error_logging, AppError, AppResult};
use crate::path_validation;

/// Prefix of staging files; the media route never serves these.
const STAGING_PREFIX: &str = ".upload-";

/// Number of leading bytes kept for image format detection
pub const FORMAT_SNIFF_BYTES: usize = 32;

/// How long stored uploads and results are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RetentionPolicy {
    /// Files accumulate indefinitely
    #[default]
    KeepForever,
    /// Files whose modification time is older than the given age are removed
    MaxAge(Duration),
}

impl RetentionPolicy {
    /// Build a policy from a number of seconds, where 0 disables cleanup
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            RetentionPolicy::KeepForever
        } else {
            RetentionPolicy::MaxAge(Duration::from_secs(secs))
        }
    }
}

/// Outcome of a retention sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files examined
    pub scanned: usize,
    /// Files removed
    pub removed: usize,
    /// Files that could not be removed
    pub failed: usize,
}

/// Run [`MediaStore::sweep_expired`] on a fixed period.
///
/// Returns `None` when the policy keeps files forever, so no task is started.
pub fn start_retention_sweeper(
    store: MediaStore,
    policy: RetentionPolicy,
    period: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if policy == RetentionPolicy::KeepForever {
        info!("Media retention disabled, files are kept forever");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            let store = store.clone();
            let started = std::time::Instant::now();
            let span = crate::observability::storage_span("retention_sweep");
            match tokio::task::spawn_blocking(move || span.in_scope(|| store.sweep_expired(policy)))
                .await
            {
                Ok(Ok(report)) => {
                    crate::observability::record_retention_metrics(&report, started.elapsed())
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Media retention sweep failed");
                    crate::observability::record_error_metrics(e.kind(), "retention");
                }
                Err(e) => warn!(error = %e, "Media retention sweep task did not complete"),
            }
        }
    }))
}

/// Handle on the media root directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the media root (and parents) if absent. Idempotent.
    pub fn ensure_root(&self) -> AppResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            error_logging::log_filesystem_error(
                &e,
                "create_media_root",
                Some(&self.root.to_string_lossy()),
                None,
            );
            AppError::Storage(format!(
                "Could not create media directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    /// Unique name for a stored upload: `<uuid>_<sanitized basename>`
    pub fn upload_filename(original: &str) -> String {
        let basename = path_validation::upload_basename(original);
        format!(
            "{}_{}",
            uuid::Uuid::new_v4(),
            path_validation::sanitize_filename(basename)
        )
    }

    /// Unique name for an annotated result: `<uuid>.jpg`
    pub fn output_filename() -> String {
        format!("{}.jpg", uuid::Uuid::new_v4())
    }

    /// Absolute location of a media file
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Start staging an upload inside the media root.
    ///
    /// The root is created if needed.
    pub fn begin_upload(&self, original_name: &str) -> AppResult<UploadWriter> {
        self.ensure_root()?;

        let temp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| AppError::Storage(format!("Could not stage upload: {}", e)))?;

        Ok(UploadWriter {
            temp,
            original_name: original_name.to_string(),
            bytes_written: 0,
            header: Vec::with_capacity(FORMAT_SNIFF_BYTES),
        })
    }

    /// Resolve a public media name to a file inside the root.
    ///
    /// Returns `None` for names that fail validation, staging files and missing files.
    pub fn resolve_media(&self, name: &str) -> Option<PathBuf> {
        if name.starts_with(STAGING_PREFIX) {
            return None;
        }
        if path_validation::validate_media_filename(name).is_err() {
            debug!(name = %name, "Rejected media name");
            return None;
        }

        let path = self.root.join(name);
        path.is_file().then_some(path)
    }

    /// Remove files older than the policy allows. `KeepForever` never touches disk.
    pub fn sweep_expired(&self, policy: RetentionPolicy) -> AppResult<SweepReport> {
        let max_age = match policy {
            RetentionPolicy::KeepForever => return Ok(SweepReport::default()),
            RetentionPolicy::MaxAge(age) => age,
        };

        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| AppError::Config(format!("Retention age out of range: {}", e)))?;
        let cutoff = chrono::Utc::now() - max_age;

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SweepReport::default())
            }
            Err(e) => return Err(e.into()),
        };

        let mut report = SweepReport::default();
        for entry in entries.flatten() {
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            report.scanned += 1;

            let modified: chrono::DateTime<chrono::Utc> = match metadata.modified() {
                Ok(time) => time.into(),
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    report.removed += 1;
                    debug!(path = %path.display(), modified = %modified, "Removed expired media file");
                }
                Err(e) => {
                    report.failed += 1;
                    error_logging::log_filesystem_error(
                        &e,
                        "sweep_expired",
                        Some(&path.to_string_lossy()),
                        Some(metadata.len()),
                    );
                }
            }
        }

        info!(
            root = %self.root.display(),
            cutoff = %cutoff,
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "Media retention sweep completed"
        );
        Ok(report)
    }
}

/// An upload being written into the media root.
///
/// Dropping the writer without calling [`UploadWriter::persist`] removes the staged
/// bytes.
pub struct UploadWriter {
    temp: NamedTempFile,
    original_name: String,
    bytes_written: u64,
    header: Vec<u8>,
}

impl UploadWriter {
    /// Append one chunk of the upload
    pub fn write_chunk(&mut self, chunk: &[u8]) -> AppResult<()> {
        if self.header.len() < FORMAT_SNIFF_BYTES {
            let take = (FORMAT_SNIFF_BYTES - self.header.len()).min(chunk.len());
            self.header.extend_from_slice(&chunk[..take]);
        }

        self.temp
            .as_file_mut()
            .write_all(chunk)
            .map_err(|e| AppError::Storage(format!("Could not write upload: {}", e)))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Image format guessed from the first bytes of the upload
    pub fn detected_format(&self) -> Option<image::ImageFormat> {
        image::guess_format(&self.header).ok()
    }

    /// Move the staged bytes to `<uuid>_<original>` and return that name and path.
    pub fn persist(mut self) -> AppResult<(String, PathBuf)> {
        self.temp
            .as_file_mut()
            .flush()
            .map_err(|e| AppError::Storage(format!("Could not flush upload: {}", e)))?;

        let filename = MediaStore::upload_filename(&self.original_name);
        let dir = self
            .temp
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let target = dir.join(&filename);

        self.temp.persist_noclobber(&target).map_err(|e| {
            warn!(target = %target.display(), error = %e.error, "Failed to persist upload");
            AppError::Storage(format!(
                "Could not store upload as {}: {}",
                target.display(),
                e.error
            ))
        })?;

        info!(
            filename = %filename,
            bytes = self.bytes_written,
            "Upload stored in media root"
        );
        Ok((filename, target))
    }
}
