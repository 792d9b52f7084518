use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ::webdav::WebDavError;
use serde::de::DeserializeOwned;

use crate::scan::StartError;
use crate::state::ErrorResponse;

const MAX_ERROR_MESSAGE: usize = 100;

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

pub fn library_error(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("library error: {}", err),
    )
}

pub fn start_error(err: StartError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        StartError::Busy(busy) => json_error(StatusCode::CONFLICT, busy.to_string()),
        StartError::Unavailable(message) => json_error(StatusCode::SERVICE_UNAVAILABLE, message),
    }
}

/// Decodes an optional JSON body. A missing or blank body yields the
/// default; anything else must parse.
pub fn optional_json<T>(body: &Bytes) -> Result<T, (StatusCode, Json<ErrorResponse>)>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        json_error(
            StatusCode::BAD_REQUEST,
            format!("invalid request body: {}", err),
        )
    })
}

/// Turns a share error into a one-line diagnostic for API callers.
pub fn short_error_message(err: &WebDavError) -> String {
    match err {
        WebDavError::Status { status: 401, .. } => "invalid credentials".to_string(),
        WebDavError::Status { status: 404, .. } => "path not found".to_string(),
        WebDavError::Status { status: 405, .. } => {
            "method not allowed (try root path / or /dav)".to_string()
        }
        WebDavError::Http(http) if http.is_timeout() => "connection timed out".to_string(),
        WebDavError::Http(http) if http.is_connect() && is_refused(http) => {
            "connection refused".to_string()
        }
        other => truncate_text(&other.to_string(), MAX_ERROR_MESSAGE),
    }
}

fn is_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        if current.to_string().to_lowercase().contains("connection refused") {
            return true;
        }
        source = current.source();
    }
    false
}

pub fn truncate_text(value: &str, max: usize) -> String {
    let mut out = String::new();
    for (count, ch) in value.chars().enumerate() {
        if count >= max {
            out.push_str("...");
            return out;
        }
        out.push(ch);
    }
    out
}

/// Page number (1-based) and size, clamped to `1..=max_size`.
pub fn page_bounds(page: Option<usize>, page_size: Option<usize>, default_size: usize, max_size: usize) -> (usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let size = page_size.unwrap_or(default_size).clamp(1, max_size);
    (page, size)
}
