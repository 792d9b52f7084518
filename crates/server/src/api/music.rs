use axum::{
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use common::{ScanStatus, TrackRecord};
use library::{LibraryStatistics, TrackFilter};
use tracing::{info, warn};

use crate::enrich::{apply_outcome, saved_cover_mime};
use crate::external::{EnrichRequest, EnrichmentClient, MetadataCatalog};
use crate::state::{
    AppState, BatchUpdateRequest, BatchUpdateResponse, DeletedResponse, JsonResult,
    LyricLineView, LyricsResponse, MusicQuery, MusicResponse, PageResponse, RefreshTagsResponse,
    UpdateMusicRequest,
};
use crate::utils::{json_error, json_error_response, library_error, page_bounds};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

fn not_found() -> (StatusCode, Json<crate::state::ErrorResponse>) {
    json_error(StatusCode::NOT_FOUND, "music not found")
}

fn load(state: &AppState, id: &str) -> Result<TrackRecord, (StatusCode, Json<crate::state::ErrorResponse>)> {
    match state.library.get(id) {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(not_found()),
        Err(err) => Err(library_error(err)),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<MusicQuery>,
) -> JsonResult<PageResponse<MusicResponse>> {
    let (page, page_size) = page_bounds(params.page, params.page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let status = match non_empty(params.status) {
        Some(value) => match ScanStatus::parse(&value) {
            Some(status) => Some(status),
            None => {
                return Err(json_error(
                    StatusCode::BAD_REQUEST,
                    format!("unknown status: {}", value),
                ))
            }
        },
        None => None,
    };
    let filter = TrackFilter {
        keyword: non_empty(params.keyword),
        title: non_empty(params.title),
        artist: non_empty(params.artist),
        album: non_empty(params.album),
        genre: non_empty(params.genre),
        status,
    };
    let (records, total) = state
        .library
        .query(&filter, page_size, (page - 1) * page_size)
        .map_err(library_error)?;
    Ok(Json(PageResponse {
        items: records.into_iter().map(MusicResponse::from).collect(),
        total,
        page,
        page_size,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<MusicResponse> {
    load(&state, &id).map(|record| Json(record.into()))
}

pub async fn update(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(request): Json<UpdateMusicRequest>,
) -> JsonResult<MusicResponse> {
    let updated = state
        .library
        .update(&id, |record| apply_edit(record, request))
        .map_err(library_error)?;
    updated.map(|record| Json(record.into())).ok_or_else(not_found)
}

fn apply_edit(record: &mut TrackRecord, request: UpdateMusicRequest) {
    let text_fields = [
        (&mut record.title, request.title),
        (&mut record.artist, request.artist),
        (&mut record.album, request.album),
        (&mut record.album_artist, request.album_artist),
        (&mut record.composer, request.composer),
        (&mut record.genre, request.genre),
        (&mut record.comment, request.comment),
    ];
    for (field, value) in text_fields {
        if let Some(value) = non_empty(value) {
            *field = value;
        }
    }
    let number_fields = [
        (&mut record.year, request.year),
        (&mut record.track_number, request.track_number),
        (&mut record.disc_number, request.disc_number),
    ];
    for (field, value) in number_fields {
        if let Some(value) = value.filter(|value| *value > 0) {
            *field = value;
        }
    }
}

pub async fn batch_update(
    State(state): State<AppState>,
    Json(request): Json<BatchUpdateRequest>,
) -> JsonResult<BatchUpdateResponse> {
    if request.ids.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "ids is required"));
    }
    let artist = non_empty(request.artist);
    let album = non_empty(request.album);
    let genre = non_empty(request.genre);
    let year = request.year.filter(|year| *year > 0);

    let mut updated = 0;
    let mut failed = 0;
    for id in &request.ids {
        let result = state.library.update(id, |record| {
            if let Some(artist) = &artist {
                record.artist = artist.clone();
            }
            if let Some(album) = &album {
                record.album = album.clone();
            }
            if let Some(genre) = &genre {
                record.genre = genre.clone();
            }
            if let Some(year) = year {
                record.year = year;
            }
        });
        match result {
            Ok(Some(_)) => updated += 1,
            Ok(None) => failed += 1,
            Err(err) => {
                warn!("Batch update of {} failed: {}", id, err);
                failed += 1;
            }
        }
    }
    Ok(Json(BatchUpdateResponse { updated, failed }))
}

pub async fn delete_one(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<DeletedResponse> {
    match state.library.delete(&id) {
        Ok(true) => Ok(Json(DeletedResponse { deleted: 1 })),
        Ok(false) => Err(not_found()),
        Err(err) => Err(library_error(err)),
    }
}

pub async fn delete_all(State(state): State<AppState>) -> JsonResult<DeletedResponse> {
    let deleted = state.library.delete_all().map_err(library_error)?;
    info!("Deleted all {} tracks", deleted);
    Ok(Json(DeletedResponse { deleted }))
}

pub async fn lyrics(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<LyricsResponse> {
    let record = load(&state, &id)?;
    if record.lyrics_path.is_empty() {
        return Err(json_error(StatusCode::NOT_FOUND, "lyrics not found"));
    }
    let content = tokio::fs::read_to_string(&record.lyrics_path)
        .await
        .map_err(|err| {
            warn!("Failed to read lyrics {}: {}", record.lyrics_path, err);
            json_error(StatusCode::NOT_FOUND, "lyrics not found")
        })?;
    let lines = metadata::parse_lrc(&content)
        .into_iter()
        .map(|line| LyricLineView {
            time: line.time,
            text: line.text,
        })
        .collect();
    Ok(Json(LyricsResponse {
        id: record.id,
        content,
        lines,
    }))
}

pub async fn cover(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> Response {
    let record = match state.library.get(&id) {
        Ok(Some(record)) => record,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "music not found"),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        }
    };
    if record.cover_path.is_empty() {
        return json_error_response(StatusCode::NOT_FOUND, "cover not found");
    }
    let data = match tokio::fs::read(&record.cover_path).await {
        Ok(data) => data,
        Err(err) => {
            warn!("Failed to read cover {}: {}", record.cover_path, err);
            return json_error_response(StatusCode::NOT_FOUND, "cover not found");
        }
    };
    let mime = if record.cover_mime.is_empty() {
        mime_guess::from_path(&record.cover_path)
            .first_or_octet_stream()
            .to_string()
    } else {
        record.cover_mime
    };
    let mut response = Response::new(Body::from(data));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=86400"),
    );
    response
}

pub async fn fetch_lyrics(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<MusicResponse> {
    enrich_one(&state, &id, true, false).await
}

pub async fn fetch_cover(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<MusicResponse> {
    enrich_one(&state, &id, false, true).await
}

async fn enrich_one(
    state: &AppState,
    id: &str,
    want_lyrics: bool,
    want_cover: bool,
) -> JsonResult<MusicResponse> {
    if state.jobs.is_running() {
        return Err(json_error(
            StatusCode::CONFLICT,
            "another batch task is running",
        ));
    }
    let record = load(state, id)?;
    let request = EnrichRequest {
        artist: record.artist.trim().to_string(),
        title: record.title.trim().to_string(),
        album: record.album.trim().to_string(),
        want_lyrics,
        want_cover,
    };
    let outcome = state.enrichment.fetch_and_save(&request).await;
    if outcome.lyrics_path().is_none() && outcome.cover_path().is_none() {
        let reason = outcome.first_error().unwrap_or("nothing found");
        return Err(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("fetch failed: {}", reason),
        ));
    }
    let cover_mime = outcome.cover_path().map(saved_cover_mime);
    let updated = state
        .library
        .update(id, |stored| {
            apply_outcome(stored, &outcome, cover_mime.as_deref());
        })
        .map_err(library_error)?;
    updated.map(|record| Json(record.into())).ok_or_else(not_found)
}

pub async fn refresh_tags(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<RefreshTagsResponse> {
    let record = load(&state, &id)?;
    if record.artist.trim().is_empty() && record.title.trim().is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "artist or title is required for a catalog lookup",
        ));
    }
    let found = state
        .catalog
        .search_track(record.artist.trim(), record.title.trim())
        .await
        .map_err(|err| {
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("metadata lookup failed: {}", err),
            )
        })?;

    let mut changed = false;
    let mut refreshed = record.clone();
    for (field, value) in [
        (&mut refreshed.title, found.title),
        (&mut refreshed.artist, found.artist),
        (&mut refreshed.album, found.album),
    ] {
        if field.is_empty() && !value.is_empty() {
            *field = value;
            changed = true;
        }
    }
    if refreshed.year == 0 && found.year > 0 {
        refreshed.year = found.year;
        changed = true;
    }
    if !changed {
        return Ok(Json(RefreshTagsResponse {
            updated: false,
            music: record.into(),
        }));
    }

    let stored = state
        .library
        .update(&id, |stored| {
            stored.title = refreshed.title.clone();
            stored.artist = refreshed.artist.clone();
            stored.album = refreshed.album.clone();
            stored.year = refreshed.year;
        })
        .map_err(library_error)?
        .ok_or_else(not_found)?;
    Ok(Json(RefreshTagsResponse {
        updated: true,
        music: stored.into(),
    }))
}

pub async fn statistics(State(state): State<AppState>) -> JsonResult<LibraryStatistics> {
    state
        .library
        .statistics()
        .map(Json)
        .map_err(library_error)
}
