use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use ::webdav::RemoteSource;
use tracing::{info, warn};

use crate::config::{save_config, WebDavConfig};
use crate::state::{
    AppState, JsonResult, WebDavConfigResponse, WebDavConfigUpdate, WebDavTestRequest,
    WebDavTestResponse,
};
use crate::utils::{json_error, optional_json, short_error_message};

const PASSWORD_MASK: &str = "******";

fn pick(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn masked(config: &WebDavConfig) -> WebDavConfigResponse {
    WebDavConfigResponse {
        url: config.url.clone(),
        username: config.username.clone(),
        password: if config.password.is_empty() {
            String::new()
        } else {
            PASSWORD_MASK.to_string()
        },
        root_path: config.root_path.clone(),
        enabled: config.enabled,
        timeout_secs: config.timeout_secs,
    }
}

/// Walks the share with the given (or saved) settings and reports how many
/// audio files it holds. Nothing is stored.
pub async fn test_connection(
    State(state): State<AppState>,
    body: Bytes,
) -> JsonResult<WebDavTestResponse> {
    let request: WebDavTestRequest = optional_json(&body)?;
    let (saved, scan) = {
        let config = state.config.read();
        (config.webdav.clone(), config.scan.clone())
    };
    let candidate = WebDavConfig {
        url: pick(request.url, &saved.url),
        username: pick(request.username, &saved.username),
        // The saved password is used when the caller echoes the mask back.
        password: match request.password {
            Some(password) if !password.is_empty() && password != PASSWORD_MASK => password,
            _ => saved.password.clone(),
        },
        root_path: pick(request.root_path, &saved.root_path),
        ..saved
    };
    if candidate.url.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "webdav url is required"));
    }

    let unavailable = |err: ::webdav::WebDavError| {
        warn!("WebDAV test against {} failed: {}", candidate.url, err);
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            short_error_message(&err),
        )
    };
    let source = state.connector.connect(&candidate).map_err(unavailable)?;
    let listing = ::webdav::walk(
        source.as_ref(),
        &candidate.root_path,
        &scan.extensions,
        scan.recursive,
    )
    .await
    .map_err(unavailable)?;

    let count = listing.files.len();
    let message = if count > 0 {
        format!("found {} audio files", count)
    } else {
        match source.list_dir(&candidate.root_path).await {
            Ok(entries) if !entries.is_empty() => format!(
                "directory contains {} entries but no matching audio files",
                entries.len()
            ),
            _ => "directory is empty".to_string(),
        }
    };
    info!("WebDAV test against {}: {}", candidate.url, message);
    Ok(Json(WebDavTestResponse {
        success: true,
        count,
        message,
    }))
}

pub async fn get_config(State(state): State<AppState>) -> Json<WebDavConfigResponse> {
    Json(masked(&state.config.read().webdav))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<WebDavConfigUpdate>,
) -> JsonResult<WebDavConfigResponse> {
    let mut next = state.config.read().clone();
    if let Some(url) = update.url {
        next.webdav.url = url.trim().to_string();
    }
    if let Some(username) = update.username {
        next.webdav.username = username.trim().to_string();
    }
    if let Some(password) = update.password.filter(|password| password != PASSWORD_MASK) {
        next.webdav.password = password;
    }
    if let Some(root_path) = update.root_path.filter(|root| !root.trim().is_empty()) {
        next.webdav.root_path = root_path.trim().to_string();
    }
    if let Some(enabled) = update.enabled {
        next.webdav.enabled = enabled;
    }
    if let Some(timeout_secs) = update.timeout_secs.filter(|secs| *secs > 0) {
        next.webdav.timeout_secs = timeout_secs;
    }

    save_config(&state.config_path, &next).map_err(|err| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to save config: {}", err),
        )
    })?;
    let response = masked(&next.webdav);
    *state.config.write() = next;
    info!("WebDAV settings updated");
    Ok(Json(response))
}
