//! Metrics collection and Prometheus export module.
//!
//! This module provides:
//! - Prometheus recorder setup
//! - The metrics and health check server
//! - Recording functions for requests, uploads, classification and retention

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::errors::error_logging;
use crate::observability::health_checks;
use crate::observability_config::ObservabilityConfig;
use crate::storage::{MediaStore, SweepReport};

/// Initialize metrics collection with Prometheus exporter and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.tags {
        builder = builder.add_global_label(key.clone(), value.clone());
    }
    let handle = builder.install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        global_labels = config.tags.len(),
        "Metrics collection initialized"
    );
    Ok(handle)
}

/// Bind the metrics server on all interfaces and start serving
pub async fn start_metrics_server(
    metrics_handle: PrometheusHandle,
    port: u16,
    store: MediaStore,
) -> Result<JoinHandle<()>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting metrics server with health checks on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    Ok(spawn_metrics_server(listener, metrics_handle, store))
}

/// Serve `/metrics`, `/health/live` and `/health/ready` on an already bound listener
pub fn spawn_metrics_server(
    listener: TcpListener,
    metrics_handle: PrometheusHandle,
    store: MediaStore,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let metrics_handle = metrics_handle.clone();
                    let store = store.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                let store = store.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            let mut response =
                                                hyper::Response::new(metrics_handle.render());
                                            response.headers_mut().insert(
                                                hyper::header::CONTENT_TYPE,
                                                hyper::header::HeaderValue::from_static(
                                                    "text/plain; version=0.0.4; charset=utf-8",
                                                ),
                                            );
                                            Ok::<_, std::convert::Infallible>(response)
                                        }
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        (&hyper::Method::GET, "/health/ready") => {
                                            match health_checks::perform_readiness_checks(&store)
                                                .await
                                            {
                                                Ok(()) => {
                                                    Ok(hyper::Response::new("OK".to_string()))
                                                }
                                                Err(e) => {
                                                    let mut response = hyper::Response::new(
                                                        format!("NOT READY: {}", e),
                                                    );
                                                    *response.status_mut() =
                                                        hyper::StatusCode::SERVICE_UNAVAILABLE;
                                                    Ok(response)
                                                }
                                            }
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            error_logging::log_network_error(
                                &err,
                                "serve_metrics_connection",
                                Some(&peer.to_string()),
                            );
                        }
                    });
                }
                Err(e) => {
                    error_logging::log_network_error(&e, "accept_metrics_connection", None);
                }
            }
        }
    })
}

/// Record request metrics
pub fn record_request_metrics(method: &str, route: &str, status: u16, duration: Duration) {
    let method = method.to_string();
    let route = route.to_string();
    let status = status.to_string();
    metrics::counter!("http_requests_total", "method" => method, "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!("http_request_duration_seconds", "route" => route)
        .record(duration.as_secs_f64());
}

/// Record the outcome of a single upload
///
/// `outcome` is `"accepted"` or the name of the validation failure.
pub fn record_upload_metrics(outcome: &str, size_bytes: u64) {
    let outcome = outcome.to_string();
    metrics::counter!("uploads_total", "outcome" => outcome).increment(1);
    metrics::histogram!("upload_size_bytes").record(size_bytes as f64);
}

/// Record grain classification metrics
pub fn record_classification_metrics(
    success: bool,
    duration: Duration,
    broken: usize,
    intact: usize,
) {
    metrics::counter!("classifications_total", "result" => if success { "success" } else { "failure" })
        .increment(1);
    metrics::histogram!("classification_duration_seconds").record(duration.as_secs_f64());

    if success {
        metrics::counter!("grains_detected_total", "label" => "broken").increment(broken as u64);
        metrics::counter!("grains_detected_total", "label" => "intact").increment(intact as u64);
        metrics::histogram!("grains_per_image").record((broken + intact) as f64);
    }
}

/// Record health check metrics
pub fn record_health_check_metrics(check_type: &str, success: bool, duration: Duration) {
    let check_type = check_type.to_string();
    metrics::counter!("health_checks_total", "check" => check_type.clone(), "result" => if success { "success" } else { "failure" })
        .increment(1);
    metrics::histogram!("health_check_duration_seconds", "check" => check_type.clone())
        .record(duration.as_secs_f64());
    metrics::gauge!("health_check_status", "check" => check_type).set(if success {
        1.0
    } else {
        0.0
    });
}

/// Record error metrics by kind and component
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

/// Record the result of a retention sweep
pub fn record_retention_metrics(report: &SweepReport, duration: Duration) {
    metrics::counter!("media_files_removed_total").increment(report.removed as u64);
    metrics::counter!("media_files_remove_failures_total").increment(report.failed as u64);
    metrics::gauge!("media_files_scanned").set(report.scanned as f64);
    metrics::histogram!("retention_sweep_duration_seconds").record(duration.as_secs_f64());
}

/// Record startup time
pub fn record_startup_metrics(duration: Duration) {
    metrics::gauge!("startup_duration_seconds").set(duration.as_secs_f64());
}
