use axum::{extract::State, Json};
use tracing::info;

use crate::enrich::start_batch;
use crate::jobs::{BatchJobStatus, JobKind};
use crate::state::{AppState, BatchStartedResponse, CancelResponse, JsonResult};
use crate::utils::start_error;

pub async fn fetch_lyrics(State(state): State<AppState>) -> JsonResult<BatchStartedResponse> {
    start(&state, JobKind::Lyrics)
}

pub async fn fetch_covers(State(state): State<AppState>) -> JsonResult<BatchStartedResponse> {
    start(&state, JobKind::Covers)
}

pub async fn fetch_all(State(state): State<AppState>) -> JsonResult<BatchStartedResponse> {
    start(&state, JobKind::All)
}

fn start(state: &AppState, kind: JobKind) -> JsonResult<BatchStartedResponse> {
    let started = start_batch(state, kind).map_err(start_error)?;
    let message = if started.task_id.is_some() {
        format!("batch {} started", kind.as_str())
    } else {
        "nothing to process".to_string()
    };
    Ok(Json(BatchStartedResponse {
        task_id: started.task_id,
        total: started.total,
        message,
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<BatchJobStatus> {
    Json(state.jobs.snapshot())
}

pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    let cancelled = state.jobs.cancel();
    if cancelled {
        info!("Cancellation requested for {}", state.jobs.snapshot().task_id);
    }
    Json(CancelResponse { cancelled })
}
