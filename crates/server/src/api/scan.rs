use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};

use crate::jobs::JobKind;
use crate::scan::start_scan;
use crate::state::{
    AppState, JsonResult, LogQuery, PageResponse, ScanRequest, ScanStatusResponse,
    TaskStartedResponse,
};
use crate::utils::{library_error, optional_json, page_bounds, start_error};
use common::ScanLogEntry;

const DEFAULT_LOG_PAGE_SIZE: usize = 50;
const MAX_LOG_PAGE_SIZE: usize = 500;

pub async fn start(
    State(state): State<AppState>,
    body: Bytes,
) -> JsonResult<TaskStartedResponse> {
    let request: ScanRequest = optional_json(&body)?;
    let task_id = start_scan(&state, request.recursive)
        .await
        .map_err(start_error)?;
    Ok(Json(TaskStartedResponse {
        task_id,
        message: "scan started".to_string(),
    }))
}

pub async fn status(State(state): State<AppState>) -> JsonResult<ScanStatusResponse> {
    let job = state.jobs.snapshot();
    let is_scanning = job.running && job.task_type == Some(JobKind::Scan);
    let task_id = (!job.task_id.is_empty()).then_some(job.task_id.as_str());
    let last_log = state.library.last_log(task_id).map_err(library_error)?;
    Ok(Json(ScanStatusResponse {
        is_scanning,
        last_log,
        job,
    }))
}

pub async fn logs(
    State(state): State<AppState>,
    Query(params): Query<LogQuery>,
) -> JsonResult<PageResponse<ScanLogEntry>> {
    let (page, page_size) = page_bounds(
        params.page,
        params.page_size,
        DEFAULT_LOG_PAGE_SIZE,
        MAX_LOG_PAGE_SIZE,
    );
    let task_id = params
        .task_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let (items, total) = state
        .library
        .list_logs(task_id, page_size, (page - 1) * page_size)
        .map_err(library_error)?;
    Ok(Json(PageResponse {
        items,
        total,
        page,
        page_size,
    }))
}
