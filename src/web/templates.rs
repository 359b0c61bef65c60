//! HTML rendering for the upload page.
//!
//! There is a single page: the upload form, optionally followed by form errors, a
//! processing error, or the annotated result.

use std::fmt::Write;

use super::form::IMAGE_FIELD;

/// Annotated result shown below the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    /// Public URL of the annotated image
    pub image_url: String,
    pub broken: usize,
    pub intact: usize,
}

/// Everything the index page can show
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPage {
    /// Validation messages for the `image` field
    pub field_errors: Vec<String>,
    /// Processing error shown above the form
    pub error: Option<String>,
    pub result: Option<ResultView>,
}

impl IndexPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_field_error(message: impl Into<String>) -> Self {
        Self {
            field_errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_result(result: ResultView) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }
}

/// Escape text for use in HTML element content and quoted attribute values
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the complete index page
pub fn render_index(page: &IndexPage) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Rice Grain Inspector</title>\n</head>\n<body>\n<h1>Rice Grain Inspector</h1>\n",
    );

    if let Some(error) = &page.error {
        let _ = writeln!(html, "<p class=\"error\">{}</p>", escape_html(error));
    }

    html.push_str("<form method=\"post\" enctype=\"multipart/form-data\">\n");
    if !page.field_errors.is_empty() {
        html.push_str("<ul class=\"errorlist\">\n");
        for message in &page.field_errors {
            let _ = writeln!(html, "<li>{}</li>", escape_html(message));
        }
        html.push_str("</ul>\n");
    }
    let _ = writeln!(
        html,
        "<p><label for=\"id_{field}\">Image:</label> <input type=\"file\" name=\"{field}\" accept=\"image/*\" required id=\"id_{field}\"></p>",
        field = IMAGE_FIELD
    );
    html.push_str("<button type=\"submit\">Upload</button>\n</form>\n");

    if let Some(result) = &page.result {
        let _ = writeln!(
            html,
            "<h2>Result</h2>\n<p>Broken grains: {} &middot; Intact grains: {}</p>\n<img src=\"{}\" alt=\"Annotated rice grains\">",
            result.broken,
            result.intact,
            escape_html(&result.image_url)
        );
    }

    html.push_str("</body>\n</html>\n");
    html
}
