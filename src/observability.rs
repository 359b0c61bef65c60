//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Metrics collection and Prometheus export
//! - Distributed tracing with OpenTelemetry
//! - Structured logging with configurable levels
//! - Health check endpoints for monitoring
//! - Environment-specific configuration support

pub mod health_checks;
pub mod metrics;
pub mod tracing_mod;

use anyhow::Result;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tokio::task::JoinHandle;

use crate::observability_config::ObservabilityConfig;
use crate::storage::MediaStore;

pub use self::metrics::{
    record_classification_metrics, record_error_metrics, record_health_check_metrics,
    record_request_metrics, record_retention_metrics, record_upload_metrics,
};
pub use self::tracing_mod::{classification_span, request_span, storage_span};

/// Handles kept alive for the lifetime of the process
#[derive(Default)]
pub struct ObservabilityGuard {
    tracer_provider: Option<SdkTracerProvider>,
    background_tasks: Vec<JoinHandle<()>>,
}

impl ObservabilityGuard {
    /// Stop background tasks and flush pending spans
    pub fn shutdown(self) {
        for task in &self.background_tasks {
            task.abort();
        }

        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "OpenTelemetry tracer provider did not shut down cleanly");
            }
        }
    }
}

/// Initialize the complete observability stack with custom configuration
///
/// Sets up logging (with OTLP span export if an endpoint is configured), then, when
/// metrics export is enabled, the Prometheus recorder, the metrics/health server and
/// the periodic health recorder.
pub async fn init_observability_with_config(
    config: &ObservabilityConfig,
    store: &MediaStore,
) -> Result<ObservabilityGuard> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    let mut guard = ObservabilityGuard {
        tracer_provider: tracing_mod::init_tracing_with_config(config)?,
        ..ObservabilityGuard::default()
    };

    if config.enable_metrics_export {
        let metrics_handle = metrics::init_metrics_with_config(config)?;
        guard.background_tasks.push(
            metrics::start_metrics_server(metrics_handle, config.metrics_port, store.clone())
                .await?,
        );
        guard
            .background_tasks
            .push(health_checks::start_health_metrics_recorder(store.clone()));
    } else {
        tracing::info!("Metrics export disabled");
    }

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_port = %config.metrics_port,
        "Observability stack initialized successfully"
    );
    Ok(guard)
}
