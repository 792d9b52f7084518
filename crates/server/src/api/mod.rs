pub mod batch;
pub mod music;
pub mod scan;
pub mod webdav;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::state::{AppState, HealthResponse};

pub fn api_router(state: AppState) -> Router {
    let scan = Router::new()
        .route("/scan", post(scan::start))
        .route("/scan/status", get(scan::status))
        .route("/scan/logs", get(scan::logs));

    let batch = Router::new()
        .route("/music/batch-fetch-lyrics", post(batch::fetch_lyrics))
        .route("/music/batch-fetch-covers", post(batch::fetch_covers))
        .route("/music/batch-fetch-all", post(batch::fetch_all))
        .route("/batch/status", get(batch::status))
        .route("/batch/cancel", post(batch::cancel));

    let music = Router::new()
        .route("/music", get(music::list).delete(music::delete_all))
        .route("/music/batch", post(music::batch_update))
        .route(
            "/music/:id",
            get(music::get_one).put(music::update).delete(music::delete_one),
        )
        .route("/music/:id/lyrics", get(music::lyrics))
        .route("/music/:id/cover", get(music::cover))
        .route("/music/:id/fetch-lyrics", post(music::fetch_lyrics))
        .route("/music/:id/fetch-cover", post(music::fetch_cover))
        .route("/music/:id/refresh-tags", post(music::refresh_tags))
        .route("/statistics", get(music::statistics));

    let webdav = Router::new()
        .route("/webdav/test", post(webdav::test_connection))
        .route(
            "/webdav/config",
            get(webdav::get_config).put(webdav::update_config),
        );

    Router::new()
        .route("/health", get(health))
        .merge(scan)
        .merge(batch)
        .merge(music)
        .merge(webdav)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
