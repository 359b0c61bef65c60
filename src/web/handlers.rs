//! # Request Handlers
//!
//! `/` serves the upload form and processes uploads; the media prefix serves stored
//! files. Form outcomes, including failures, are always rendered as HTTP 200 pages.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{info, Instrument};

use super::form::{self, UploadError};
use super::templates::{render_index, IndexPage, ResultView};
use super::AppState;
use crate::errors::AppError;
use crate::observability;

/// Response type produced by every handler
pub type HttpResponse = Response<Full<Bytes>>;

/// Route a request and record its metrics
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<HttpResponse, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = observability::request_span(method.as_str(), &path);

    let (route, response) = async {
        if path == "/" {
            return ("index", handle_index(req, &state).await);
        }

        if let Some(prefix) = state.config.media.local_route() {
            if let Some(name) = path.strip_prefix(prefix) {
                if method == Method::GET || method == Method::HEAD {
                    return ("media", serve_media(name, &state, method == Method::HEAD).await);
                }
            }
        }

        ("not_found", not_found())
    }
    .instrument(span)
    .await;

    observability::record_request_metrics(
        method.as_str(),
        route,
        response.status().as_u16(),
        start.elapsed(),
    );
    Ok(response)
}

/// `GET /` renders the empty form; `POST /` handles an upload
pub async fn handle_index<B>(req: Request<B>, state: &AppState) -> HttpResponse
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if req.method() != Method::POST {
        return html_page(&IndexPage::empty());
    }

    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let upload = match form::read_upload(
        content_type.as_deref(),
        req.into_body(),
        &state.store,
        state.config.server.max_upload_bytes,
    )
    .await
    {
        Ok(upload) => upload,
        Err(UploadError::Rejected(rejection)) => {
            observability::record_upload_metrics(rejection.label(), 0);
            return html_page(&IndexPage::with_field_error(rejection.to_string()));
        }
        Err(UploadError::Failed(error)) => {
            observability::record_error_metrics(error.kind(), "upload");
            return html_page(&IndexPage::with_error(present_error(&error)));
        }
    };
    observability::record_upload_metrics("accepted", upload.size_bytes);

    info!(
        original_name = %upload.original_name,
        stored_as = %upload.filename,
        format = ?upload.format,
        size_bytes = upload.size_bytes,
        "Upload accepted"
    );

    let classifier = state.classifier.clone();
    let path = upload.path.clone();
    let span = observability::classification_span(&upload.filename);
    let start = Instant::now();

    let outcome = tokio::task::spawn_blocking(move || span.in_scope(|| classifier.classify(&path)))
        .await
        .map_err(|e| AppError::Internal(format!("Classification task failed: {}", e)))
        .and_then(|result| result);

    match outcome {
        Ok(report) => {
            observability::record_classification_metrics(
                true,
                start.elapsed(),
                report.broken_count(),
                report.intact_count(),
            );
            html_page(&IndexPage::with_result(ResultView {
                image_url: format!(
                    "{}{}",
                    state.config.media.url_prefix, report.output_filename
                ),
                broken: report.broken_count(),
                intact: report.intact_count(),
            }))
        }
        Err(error) => {
            observability::record_classification_metrics(false, start.elapsed(), 0, 0);
            observability::record_error_metrics(error.kind(), "classifier");
            html_page(&IndexPage::with_error(present_error(&error)))
        }
    }
}

/// Message shown on the form for a failed upload or classification
pub fn present_error(error: &AppError) -> String {
    match error {
        AppError::Validation(message) => message.clone(),
        AppError::Storage(_) => format!("Error saving image: {}", error.user_message()),
        AppError::Load { .. } | AppError::Internal(_) | AppError::Config(_) => {
            format!("Error processing image: {}", error.user_message())
        }
    }
}

/// Serve a file from the media root
pub async fn serve_media(raw_name: &str, state: &AppState, head_only: bool) -> HttpResponse {
    let Some(name) = percent_decode(raw_name) else {
        return not_found();
    };
    let Some(path) = state.store.resolve_media(&name) else {
        return not_found();
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            crate::errors::error_logging::log_filesystem_error(
                &e,
                "serve_media",
                Some(&path.to_string_lossy()),
                None,
            );
            return not_found();
        }
    };

    let content_type = image::ImageFormat::from_path(&path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    let body = if head_only {
        Bytes::new()
    } else {
        Bytes::from(bytes)
    };
    let mut response = Response::new(Full::new(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Decode `%XX` escapes in a URL path segment. Invalid escapes or non-UTF-8 results
/// yield `None`.
fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn html_page(page: &IndexPage) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(render_index(page))));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn not_found() -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b.jpg").as_deref(), Some("a b.jpg"));
        assert_eq!(percent_decode("plain.jpg").as_deref(), Some("plain.jpg"));
        assert_eq!(percent_decode("%2e%2e").as_deref(), Some(".."));
        assert_eq!(percent_decode("bad%zz"), None);
        assert_eq!(percent_decode("cut%2"), None);
    }

    #[test]
    fn test_percent_decode_multibyte() {
        assert_eq!(percent_decode("caf%C3%A9.jpg").as_deref(), Some("caf\u{e9}.jpg"));
        assert_eq!(percent_decode("caf%c3%a9.jpg").as_deref(), Some("caf\u{e9}.jpg"));
        assert_eq!(percent_decode("caf\u{e9}.jpg").as_deref(), Some("caf\u{e9}.jpg"));
        // A lone lead byte is not valid UTF-8
        assert_eq!(percent_decode("caf%C3.jpg"), None);
        assert_eq!(percent_decode("%+1"), None);
    }

    #[test]
    fn test_present_error_per_kind() {
        let load = AppError::load(PathBuf::from("/m/x_notes.png"), "bad header");
        assert_eq!(
            present_error(&load),
            "Error processing image: Could not read image: /m/x_notes.png (bad header)"
        );

        let storage = AppError::Storage("disk full".to_string());
        assert_eq!(present_error(&storage), "Error saving image: disk full");

        let validation = AppError::Validation("This field is required.".to_string());
        assert_eq!(present_error(&validation), "This field is required.");
    }
}
