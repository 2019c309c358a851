//! Rendered HTML view of a paste.

use super::request_time::RequestNow;
use crate::{AppError, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use pastebin_core::models::{paste::format_iso_millis, PasteView};

const PAGE_STYLE: &str = "body{margin:0;background:#fff;font-family:system-ui,sans-serif;color:#333}\
main{max-width:800px;margin:0 auto;padding:2rem}\
pre{white-space:pre-wrap;word-wrap:break-word;font-family:monospace;font-size:14px;line-height:1.5;margin:0;\
background:#f8f9fa;border:1px solid #dee2e6;border-radius:4px;padding:1.5rem}\
footer{font-size:12px;color:#666;text-align:center;margin-top:1rem}";

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en"><head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title><style>{PAGE_STYLE}</style></head>
<body><main>{body}</main></body></html>"#
    )
}

/// Page for a served paste. Content and id are HTML-escaped.
pub fn render_paste(id: &str, view: &PasteView) -> String {
    let mut footer = format!("Paste ID: {}", html_escape::encode_safe(id));
    if let Some(remaining) = view.remaining_views {
        footer.push_str(&format!(" &middot; {} views remaining", remaining));
    }
    if let Some(expires_at) = view.expires_at.as_ref() {
        footer.push_str(&format!(" &middot; expires {}", format_iso_millis(expires_at)));
    }

    layout(
        "Paste",
        &format!(
            "<pre>{}</pre><footer>{}</footer>",
            html_escape::encode_safe(&view.content),
            footer
        ),
    )
}

/// Page shown for absent, expired and exhausted pastes.
pub fn render_not_found() -> String {
    layout(
        "Paste Not Found",
        "<h1>404 - Paste Not Found</h1>\
<p>This paste does not exist, has expired, or has reached its view limit.</p>",
    )
}

fn render_unavailable() -> String {
    layout(
        "Temporarily Unavailable",
        "<h1>Temporarily Unavailable</h1><p>Please try again in a moment.</p>",
    )
}

/// Render a paste as HTML. Counts a view exactly like the JSON read.
pub async fn paste_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RequestNow(now): RequestNow,
) -> Response {
    match state.service.read_at(&id, now).await {
        Ok(view) => Html(render_paste(&id, &view)).into_response(),
        Err(AppError::NotFound) => {
            (StatusCode::NOT_FOUND, Html(render_not_found())).into_response()
        }
        Err(AppError::Store(err)) => {
            tracing::error!("Store error rendering paste {}: {}", id, err);
            (StatusCode::SERVICE_UNAVAILABLE, Html(render_unavailable())).into_response()
        }
        Err(err) => {
            tracing::error!("Failed to render paste {}: {}", id, err);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(render_unavailable())).into_response()
        }
    }
}
