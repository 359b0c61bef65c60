//! # Observability Tests Module
//!
//! Metrics server endpoints, readiness against the media root, span export and the
//! recording helpers used across the service.

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
    use rice_inspector::observability;
    use rice_inspector::observability::metrics::spawn_metrics_server;
    use rice_inspector::observability_config::ObservabilityConfig;
    use rice_inspector::storage::{MediaStore, SweepReport};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tracing_subscriber::prelude::*;

    async fn start_server(store: MediaStore) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind metrics listener");
        let addr = listener.local_addr().expect("local addr");
        // Not installed globally, so tests do not fight over the recorder
        let handle = PrometheusBuilder::new().build_recorder().handle();
        (
            format!("http://{}", addr),
            spawn_metrics_server(listener, handle, store),
        )
    }

    /// Test that metrics recording functions work without an installed recorder
    #[test]
    fn test_metrics_recording() {
        observability::record_request_metrics("GET", "index", 200, Duration::from_millis(25));
        observability::record_upload_metrics("accepted", 2048);
        observability::record_upload_metrics("empty", 0);
        observability::record_classification_metrics(true, Duration::from_millis(40), 2, 7);
        observability::record_classification_metrics(false, Duration::from_millis(5), 0, 0);
        observability::record_health_check_metrics("media_root", true, Duration::from_millis(1));
        observability::record_error_metrics("load", "classifier");
        observability::record_retention_metrics(
            &SweepReport {
                scanned: 4,
                removed: 1,
                failed: 0,
            },
            Duration::from_millis(3),
        );
    }

    /// Test span creation functions
    #[test]
    fn test_span_creation() {
        let request = observability::request_span("POST", "/");
        let classification = observability::classification_span("abc_rice.png");
        let storage = observability::storage_span("retention_sweep");

        let _entered = request.enter();
        classification.in_scope(|| {});
        storage.in_scope(|| {});
    }

    #[test]
    fn test_env_filter_accepts_configured_level() {
        let mut config = ObservabilityConfig::default();
        config.log_level = "debug".to_string();
        assert!(observability::tracing_mod::build_env_filter(&config).is_ok());
    }

    #[test]
    fn test_spans_are_exported_through_the_otel_layer() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let subscriber = tracing_subscriber::registry()
            .with(observability::tracing_mod::otel_layer(&provider));

        tracing::subscriber::with_default(subscriber, || {
            let request = observability::request_span("POST", "/");
            request.in_scope(|| {
                let classification = observability::classification_span("abc_rice.png");
                classification.in_scope(|| tracing::info!("classifying"));
            });
        });
        provider.force_flush().expect("flush spans");

        let names: Vec<String> = exporter
            .get_finished_spans()
            .expect("finished spans")
            .iter()
            .map(|span| span.name.to_string())
            .collect();
        assert!(names.contains(&"http_request".to_string()), "{:?}", names);
        assert!(names.contains(&"classification".to_string()), "{:?}", names);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_otlp_provider_only_with_an_endpoint() {
        let mut config = ObservabilityConfig::default();
        assert!(observability::tracing_mod::build_otlp_tracer_provider(&config)
            .expect("no endpoint is fine")
            .is_none());

        config.otlp_endpoint = Some("http://127.0.0.1:4317".to_string());
        let provider = observability::tracing_mod::build_otlp_tracer_provider(&config)
            .expect("exporter builds without connecting")
            .expect("provider is built for an endpoint");
        let _ = provider.shutdown();
    }

    #[tokio::test]
    async fn test_liveness_and_metrics_endpoints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (base, server) = start_server(MediaStore::new(dir.path())).await;
        let client = reqwest::Client::new();

        let live = client
            .get(format!("{}/health/live", base))
            .send()
            .await
            .expect("liveness request");
        assert_eq!(live.status(), reqwest::StatusCode::OK);
        assert_eq!(live.text().await.expect("body"), "OK");

        let metrics = client
            .get(format!("{}/metrics", base))
            .send()
            .await
            .expect("metrics request");
        assert_eq!(metrics.status(), reqwest::StatusCode::OK);
        let content_type = metrics
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/plain"));

        let missing = client
            .get(format!("{}/nope", base))
            .send()
            .await
            .expect("unknown path request");
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        server.abort();
    }

    #[tokio::test]
    async fn test_readiness_follows_media_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = reqwest::Client::new();

        let (ready_base, ready_server) = start_server(MediaStore::new(dir.path())).await;
        let ready = client
            .get(format!("{}/health/ready", ready_base))
            .send()
            .await
            .expect("readiness request");
        assert_eq!(ready.status(), reqwest::StatusCode::OK);

        let (absent_base, absent_server) =
            start_server(MediaStore::new(dir.path().join("absent"))).await;
        let not_ready = client
            .get(format!("{}/health/ready", absent_base))
            .send()
            .await
            .expect("readiness request");
        assert_eq!(not_ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert!(not_ready
            .text()
            .await
            .expect("body")
            .starts_with("NOT READY"));

        ready_server.abort();
        absent_server.abort();
    }
}
