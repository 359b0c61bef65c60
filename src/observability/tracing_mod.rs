//! Tracing and logging setup module.
//!
//! This module provides:
//! - Structured logging configuration
//! - OpenTelemetry distributed tracing
//! - Tracing span creation utilities

use anyhow::Result;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

use crate::observability_config::ObservabilityConfig;

/// Instrumentation scope name reported with exported spans
const SERVICE_NAME: &str = "rice-inspector";

/// Build the log filter: `RUST_LOG` first, then the configured crate level
pub fn build_env_filter(config: &ObservabilityConfig) -> Result<tracing_subscriber::EnvFilter> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("rice_inspector={}", config.log_level).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("h2=warn".parse()?);
    Ok(filter)
}

/// Initialize structured logging with tracing and configuration
///
/// When an OTLP endpoint is configured the tracer provider is built and installed
/// globally first, and spans are bridged to it through an OpenTelemetry layer. The
/// provider is returned so it can be flushed at shutdown.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<SdkTracerProvider>> {
    let filter = build_env_filter(config)?;

    let tracer_provider = build_otlp_tracer_provider(config)?;
    if let Some(provider) = &tracer_provider {
        global::set_tracer_provider(provider.clone());
    }
    let otel = tracer_provider.as_ref().map(otel_layer);

    // LOG_FORMAT wins; otherwise pretty for development and JSON elsewhere
    let pretty = match std::env::var("LOG_FORMAT") {
        Ok(format) => format == "pretty",
        Err(_) => config.is_development(),
    };

    if pretty {
        tracing_subscriber::registry()
            .with(filter)
            .with(otel)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(otel)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        otlp_export = tracer_provider.is_some(),
        "Tracing initialized with structured logging"
    );
    Ok(tracer_provider)
}

/// Build the OTLP tracer provider, or `None` when no endpoint is configured
///
/// Must be called from within a tokio runtime.
pub fn build_otlp_tracer_provider(
    config: &ObservabilityConfig,
) -> Result<Option<SdkTracerProvider>> {
    let Some(endpoint) = &config.otlp_endpoint else {
        return Ok(None);
    };

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()?;

    let sampler = if config.enable_trace_sampling {
        Sampler::TraceIdRatioBased(config.trace_sampling_ratio)
    } else {
        Sampler::AlwaysOn
    };

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_sampler(sampler)
        .build();

    Ok(Some(tracer_provider))
}

/// Layer exporting `tracing` spans through the given provider
pub fn otel_layer<S>(provider: &SdkTracerProvider) -> OpenTelemetryLayer<S, SdkTracer>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
}

/// Create a span for an HTTP request
pub fn request_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = method,
        path = path,
        component = "web"
    )
}

/// Create a span for grain classification of a stored upload
pub fn classification_span(upload: &str) -> tracing::Span {
    tracing::info_span!(
        "classification",
        upload = upload,
        component = "classifier"
    )
}

/// Create a span for media storage maintenance
pub fn storage_span(operation: &str) -> tracing::Span {
    tracing::info_span!("storage_operation", operation = operation, component = "storage")
}
