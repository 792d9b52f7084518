use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use common::{format_duration, format_file_size, ScanLogEntry, TrackRecord};
use library::Library;
use metadata::TagDecoder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::external::{EnrichmentClient, MetadataCatalog};
use crate::jobs::{BatchJobStatus, JobManager};
use crate::scan::SourceConnector;

#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub library: Library,
    pub jobs: JobManager,
    pub connector: Arc<dyn SourceConnector>,
    pub decoder: Arc<dyn TagDecoder>,
    pub enrichment: Arc<dyn EnrichmentClient>,
    pub catalog: Arc<dyn MetadataCatalog>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    pub recursive: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStartedResponse {
    pub task_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ScanStatusResponse {
    pub is_scanning: bool,
    pub last_log: Option<ScanLogEntry>,
    pub job: BatchJobStatus,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub task_id: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchStartedResponse {
    pub task_id: Option<String>,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct MusicQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub keyword: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub status: Option<String>,
}

/// A track as returned by the API, with display strings for size and length.
#[derive(Debug, Serialize, Deserialize)]
pub struct MusicResponse {
    #[serde(flatten)]
    pub record: TrackRecord,
    pub file_size_str: String,
    pub duration_str: String,
}

impl From<TrackRecord> for MusicResponse {
    fn from(record: TrackRecord) -> Self {
        Self {
            file_size_str: format_file_size(record.file_size),
            duration_str: format_duration(record.duration),
            record,
        }
    }
}

/// Manual edit. Empty strings and zeros leave the stored value alone.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMusicRequest {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchUpdateRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchUpdateResponse {
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LyricLineView {
    pub time: f64,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LyricsResponse {
    pub id: String,
    pub content: String,
    pub lines: Vec<LyricLineView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTagsResponse {
    pub updated: bool,
    pub music: MusicResponse,
}

/// Connection test input. Missing fields fall back to the saved share.
#[derive(Debug, Default, Deserialize)]
pub struct WebDavTestRequest {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub root_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebDavTestResponse {
    pub success: bool,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebDavConfigResponse {
    pub url: String,
    pub username: String,
    pub password: String,
    pub root_path: String,
    pub enabled: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebDavConfigUpdate {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub root_path: Option<String>,
    pub enabled: Option<bool>,
    pub timeout_secs: Option<u64>,
}
