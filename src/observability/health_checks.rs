//! Health check functionality module.
//!
//! This module provides:
//! - Media root availability and writability checks
//! - Readiness checks for the metrics server
//! - A background recorder publishing health check metrics

use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::storage::MediaStore;

/// Interval between background health checks
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Perform comprehensive readiness checks
pub async fn perform_readiness_checks(store: &MediaStore) -> Result<()> {
    check_media_root_health(store).await
}

/// Check that the media root exists and accepts new files
pub async fn check_media_root_health(store: &MediaStore) -> Result<()> {
    let root = store.root().to_path_buf();

    tokio::task::spawn_blocking(move || {
        if !root.is_dir() {
            return Err(anyhow::anyhow!(
                "Media root {} is not a directory",
                root.display()
            ));
        }

        // The probe file is removed when dropped
        tempfile::Builder::new()
            .prefix(".health-")
            .tempfile_in(&root)
            .map_err(|e| anyhow::anyhow!("Media root {} is not writable: {}", root.display(), e))?;

        tracing::debug!(root = %root.display(), "Media root health check passed");
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("Media root health check did not complete: {}", e))?
}

/// Start a background task to periodically record health check metrics
pub fn start_health_metrics_recorder(store: MediaStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);

        loop {
            interval.tick().await;

            let check_start = Instant::now();
            let healthy = check_media_root_health(&store).await.is_ok();
            crate::observability::metrics::record_health_check_metrics(
                "media_root",
                healthy,
                check_start.elapsed(),
            );
        }
    })
}
