use std::sync::Arc;

use common::LogLevel;
use library::Library;
use metadata::TagDecoder;
use tracing::{error, info, warn};
use webdav::{walk, RemoteFile, RemoteSource, WebDavClient, WebDavError};

use crate::config::WebDavConfig;
use crate::jobs::{JobBusy, JobKind, JobToken};
use crate::state::AppState;
use crate::utils::short_error_message;

/// Opens a remote share from its configuration.
pub trait SourceConnector: Send + Sync {
    fn connect(&self, config: &WebDavConfig) -> Result<Arc<dyn RemoteSource>, WebDavError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WebDavConnector;

impl SourceConnector for WebDavConnector {
    fn connect(&self, config: &WebDavConfig) -> Result<Arc<dyn RemoteSource>, WebDavError> {
        let client = WebDavClient::new(&config.settings())?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug)]
pub enum StartError {
    Unavailable(String),
    Busy(JobBusy),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::Unavailable(message) => write!(f, "{}", message),
            StartError::Busy(busy) => write!(f, "{}", busy),
        }
    }
}

impl From<JobBusy> for StartError {
    fn from(err: JobBusy) -> Self {
        StartError::Busy(err)
    }
}

/// Everything one scan run needs, detached from `AppState`.
pub struct ScanJob {
    pub library: Library,
    pub source: Arc<dyn RemoteSource>,
    pub decoder: Arc<dyn TagDecoder>,
    pub root: String,
    pub extensions: Vec<String>,
    pub recursive: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Checks the share, claims the job slot and launches the scan. Returns the
/// task id once the job is running in the background.
pub async fn start_scan(state: &AppState, recursive: Option<bool>) -> Result<String, StartError> {
    let config = state.config.read().clone();
    if !config.webdav.is_configured() {
        return Err(StartError::Unavailable(
            "webdav share is not configured".to_string(),
        ));
    }
    if state.jobs.is_running() {
        return Err(StartError::Busy(JobBusy));
    }
    let source = state
        .connector
        .connect(&config.webdav)
        .map_err(|err| StartError::Unavailable(short_error_message(&err)))?;
    if let Err(err) = source.probe(&config.webdav.root_path).await {
        warn!("WebDAV probe of {} failed: {}", config.webdav.root_path, err);
        return Err(StartError::Unavailable(short_error_message(&err)));
    }

    let token = state.jobs.try_start(JobKind::Scan, 0)?;
    let task_id = token.task_id().to_string();
    let job = ScanJob {
        library: state.library.clone(),
        source,
        decoder: Arc::clone(&state.decoder),
        root: config.webdav.root_path.clone(),
        extensions: config.scan.extensions.clone(),
        recursive: recursive.unwrap_or(config.scan.recursive),
    };
    state.jobs.launch(async move {
        run_scan(job, token).await;
    });
    Ok(task_id)
}

pub async fn run_scan(job: ScanJob, token: JobToken) -> ScanSummary {
    let task_id = token.task_id().to_string();
    let log = |level: LogLevel, message: String| append_log(&job.library, &task_id, level, message);
    let mut summary = ScanSummary::default();

    log(LogLevel::Info, "Scan started".to_string());

    let listing = tokio::select! {
        result = walk(job.source.as_ref(), &job.root, &job.extensions, job.recursive) => result,
        _ = token.cancelled() => {
            log(LogLevel::Info, "Scan cancelled before listing finished".to_string());
            summary.cancelled = true;
            token.finish("Cancelled");
            return summary;
        }
    };
    let listing = match listing {
        Ok(listing) => listing,
        Err(err) => {
            log(LogLevel::Error, format!("Failed to list files: {}", err));
            token.finish(format!("Failed: {}", short_error_message(&err)));
            return summary;
        }
    };
    for (path, err) in &listing.skipped_directories {
        log(
            LogLevel::Error,
            format!("Skipped unreadable directory: {} ({})", path, err),
        );
    }

    let files = listing.files;
    summary.total = files.len();
    token.set_total(summary.total);
    log(LogLevel::Info, format!("Found {} audio files", summary.total));

    for (index, file) in files.iter().enumerate() {
        if token.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let position = index + 1;
        token.begin_item(position, format!("Processing: {}", file.name));
        log(
            LogLevel::Info,
            format!("Processing [{}/{}]: {}", position, summary.total, file.name),
        );

        let fetched = tokio::select! {
            result = job.source.fetch_file(&file.path) => Some(result),
            _ = token.cancelled() => None,
        };
        let ok = match fetched {
            None => {
                summary.cancelled = true;
                break;
            }
            Some(Err(err)) => {
                log(
                    LogLevel::Error,
                    format!("Failed to get file {}: {}", file.name, err),
                );
                if let Err(err) =
                    job.library
                        .upsert_failed(&file.path, &file.name, file.size, &err.to_string())
                {
                    log(LogLevel::Error, format!("Failed to save {}: {}", file.name, err));
                }
                false
            }
            Some(Ok(bytes)) => ingest(&job, file, bytes).await.map_or_else(
                |message| {
                    log(LogLevel::Error, message);
                    false
                },
                |_| {
                    log(LogLevel::Info, format!("Success: {}", file.name));
                    true
                },
            ),
        };
        if ok {
            summary.success += 1;
        } else {
            summary.failed += 1;
        }
        token.record_item(ok);
    }

    if summary.cancelled {
        log(
            LogLevel::Info,
            format!(
                "Scan cancelled after {} of {} files. Success: {}, Failed: {}",
                summary.success + summary.failed,
                summary.total,
                summary.success,
                summary.failed
            ),
        );
        token.finish("Cancelled");
    } else {
        log(
            LogLevel::Info,
            format!(
                "Scan completed. Total: {}, Success: {}, Failed: {}",
                summary.total, summary.success, summary.failed
            ),
        );
        token.finish("Completed");
    }
    summary
}

/// Decodes tags off the runtime threads and upserts the result.
async fn ingest(job: &ScanJob, file: &RemoteFile, bytes: bytes::Bytes) -> Result<(), String> {
    let decoder = Arc::clone(&job.decoder);
    let path = file.path.clone();
    let name = file.name.clone();
    let size = if file.size > 0 {
        file.size
    } else {
        bytes.len() as u64
    };
    let record = tokio::task::spawn_blocking(move || {
        metadata::extract(decoder.as_ref(), &bytes, &path, &name, size)
    })
    .await
    .map_err(|err| format!("Failed to decode {}: {}", file.name, err))?;
    job.library
        .upsert_scanned(record)
        .map(|_| ())
        .map_err(|err| format!("Failed to save {}: {}", file.name, err))
}

fn append_log(library: &Library, task_id: &str, level: LogLevel, message: String) {
    match level {
        LogLevel::Info => info!(task_id = %task_id, "{}", message),
        LogLevel::Error => error!(task_id = %task_id, "{}", message),
    }
    if let Err(err) = library.append_log(task_id, level, &message) {
        warn!("Failed to store scan log for {}: {}", task_id, err);
    }
}
