use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{ScanStatus, TrackRecord};
use library::{Library, LibraryError};
use serde::Serialize;
use tracing::{info, warn};

use crate::external::{EnrichOutcome, EnrichRequest, EnrichmentClient};
use crate::jobs::{JobKind, JobToken};
use crate::scan::StartError;
use crate::state::AppState;

pub struct BatchJob {
    pub library: Library,
    pub client: Arc<dyn EnrichmentClient>,
    pub delay: Duration,
    pub targets: Vec<TrackRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub lyrics_saved: usize,
    pub covers_saved: usize,
    pub cancelled: bool,
}

/// Accepted batch start. `task_id` is `None` when nothing needed work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchStarted {
    pub task_id: Option<String>,
    pub total: usize,
}

/// Records a batch of `kind` would visit.
pub fn select_targets(library: &Library, kind: JobKind) -> Result<Vec<TrackRecord>, LibraryError> {
    match kind {
        JobKind::Lyrics => library.list_where(|record| !record.has_lyrics),
        JobKind::Covers => library.list_where(|record| !record.has_cover),
        JobKind::All | JobKind::Scan => {
            library.list_where(|record| record.scan_status == ScanStatus::Success)
        }
    }
}

pub fn request_for(record: &TrackRecord, kind: JobKind) -> EnrichRequest {
    EnrichRequest {
        artist: record.artist.trim().to_string(),
        title: record.title.trim().to_string(),
        album: record.album.trim().to_string(),
        want_lyrics: kind.wants_lyrics() && !record.has_lyrics,
        want_cover: kind.wants_cover() && !record.has_cover,
    }
}

const DEFAULT_COVER_MIME: &str = "image/jpeg";

/// Content type of a saved cover, read from its first bytes and falling back
/// to the file extension.
pub fn saved_cover_mime(path: &Path) -> String {
    let mut head = [0u8; 8];
    let read = File::open(path).and_then(|mut file| file.read(&mut head));
    if let Some(mime) = read.ok().and_then(|len| metadata::sniff_image_mime(&head[..len])) {
        return mime;
    }
    mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_COVER_MIME.to_string())
}

/// Copies saved paths from `outcome` onto the record. Returns whether
/// anything changed.
pub fn apply_outcome(
    record: &mut TrackRecord,
    outcome: &EnrichOutcome,
    cover_mime: Option<&str>,
) -> bool {
    let mut changed = false;
    if let Some(path) = outcome.lyrics_path() {
        record.has_lyrics = true;
        record.lyrics_path = path.to_string_lossy().into_owned();
        changed = true;
    }
    if let Some(path) = outcome.cover_path() {
        record.has_cover = true;
        record.cover_mime = cover_mime.unwrap_or(DEFAULT_COVER_MIME).to_string();
        record.cover_path = path.to_string_lossy().into_owned();
        changed = true;
    }
    changed
}

pub fn start_batch(state: &AppState, kind: JobKind) -> Result<BatchStarted, StartError> {
    let targets = select_targets(&state.library, kind)
        .map_err(|err| StartError::Unavailable(format!("library error: {}", err)))?;
    if state.jobs.is_running() {
        return Err(StartError::Busy(crate::jobs::JobBusy));
    }
    if targets.is_empty() {
        return Ok(BatchStarted {
            task_id: None,
            total: 0,
        });
    }

    let total = targets.len();
    let token = state.jobs.try_start(kind, total)?;
    let task_id = token.task_id().to_string();
    let delay = Duration::from_millis(state.config.read().enrichment.request_delay_ms);
    let job = BatchJob {
        library: state.library.clone(),
        client: Arc::clone(&state.enrichment),
        delay,
        targets,
    };
    info!("Batch {} started: {} tracks ({})", kind.as_str(), total, task_id);
    state.jobs.launch(async move {
        run_batch(job, token).await;
    });
    Ok(BatchStarted {
        task_id: Some(task_id),
        total,
    })
}

pub async fn run_batch(job: BatchJob, token: JobToken) -> BatchSummary {
    let kind = token.kind();
    let mut summary = BatchSummary {
        total: job.targets.len(),
        ..BatchSummary::default()
    };
    token.set_total(summary.total);

    for (index, record) in job.targets.iter().enumerate() {
        if token.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let label = if record.title.is_empty() {
            record.file_name.as_str()
        } else {
            record.title.as_str()
        };
        token.begin_item(index + 1, format!("Processing: {}", label));

        let request = request_for(record, kind);
        if !request.want_lyrics && !request.want_cover {
            summary.success += 1;
            token.record_item(true);
            continue;
        }

        let outcome = tokio::select! {
            outcome = job.client.fetch_and_save(&request) => outcome,
            _ = token.cancelled() => {
                summary.cancelled = true;
                break;
            }
        };

        let saved_lyrics = outcome.lyrics_path().is_some();
        let saved_cover = outcome.cover_path().is_some();
        let mut ok = saved_lyrics || saved_cover;
        if ok {
            let cover_mime = outcome.cover_path().map(saved_cover_mime);
            match job
                .library
                .update(&record.id, |stored| {
                    apply_outcome(stored, &outcome, cover_mime.as_deref());
                }) {
                Ok(Some(_)) => {
                    if saved_lyrics {
                        summary.lyrics_saved += 1;
                    }
                    if saved_cover {
                        summary.covers_saved += 1;
                    }
                }
                Ok(None) => {
                    warn!("Track {} vanished during batch", record.file_path);
                    ok = false;
                }
                Err(err) => {
                    warn!("Failed to save enrichment for {}: {}", record.file_path, err);
                    ok = false;
                }
            }
        } else if let Some(err) = outcome.first_error() {
            info!("Nothing saved for {}: {}", label, err);
        }

        if ok {
            summary.success += 1;
        } else {
            summary.failed += 1;
        }
        token.record_item(ok);

        if index + 1 < summary.total {
            tokio::select! {
                _ = tokio::time::sleep(job.delay) => {}
                _ = token.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
            }
        }
    }

    info!(
        "Batch {} finished: {} ok, {} failed, {} lyrics, {} covers",
        kind.as_str(),
        summary.success,
        summary.failed,
        summary.lyrics_saved,
        summary.covers_saved
    );
    token.finish(if summary.cancelled { "Cancelled" } else { "Completed" });
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobManager;
    use crate::test_support::{scanned_track, FakeEnricher};

    fn open_library(dir: &tempfile::TempDir) -> Library {
        Library::open(&dir.path().join("index.redb")).unwrap()
    }

    fn batch(library: &Library, client: FakeEnricher, kind: JobKind) -> BatchJob {
        BatchJob {
            library: library.clone(),
            client: Arc::new(client),
            delay: Duration::from_millis(1),
            targets: select_targets(library, kind).unwrap(),
        }
    }

    #[test]
    fn selection_follows_kind() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        let mut with_lyrics = scanned_track("/dav/a.mp3", "A", "Band");
        with_lyrics.has_lyrics = true;
        library.upsert_scanned(with_lyrics).unwrap();
        library.upsert_scanned(scanned_track("/dav/b.mp3", "B", "Band")).unwrap();
        library.upsert_failed("/dav/c.mp3", "c.mp3", 1, "boom").unwrap();

        assert_eq!(select_targets(&library, JobKind::Lyrics).unwrap().len(), 2);
        assert_eq!(select_targets(&library, JobKind::Covers).unwrap().len(), 3);
        assert_eq!(select_targets(&library, JobKind::All).unwrap().len(), 2);

        let all = select_targets(&library, JobKind::All).unwrap();
        let request = request_for(&all[0], JobKind::All);
        assert!(!request.want_lyrics);
        assert!(request.want_cover);
    }

    #[tokio::test]
    async fn partial_success_counts_as_success() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        library.upsert_scanned(scanned_track("/dav/b.mp3", "Missing", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::All, 2).unwrap();

        let client = FakeEnricher::new(dir.path()).failing_cover().without_title("Missing");
        let summary = run_batch(batch(&library, client, JobKind::All), token).await;

        assert_eq!((summary.success, summary.failed), (1, 1));
        assert_eq!((summary.lyrics_saved, summary.covers_saved), (1, 0));
        let a = library.find_by_path("/dav/a.mp3").unwrap().unwrap();
        assert!(a.has_lyrics);
        assert!(!a.has_cover);
        assert!(!a.lyrics_path.is_empty());

        let status = jobs.snapshot();
        assert!(!status.running);
        assert_eq!(status.message, "Completed");
        assert_eq!((status.current, status.success, status.failed), (2, 1, 1));
    }

    #[tokio::test]
    async fn cover_batch_sets_mime() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::Covers, 1).unwrap();

        let summary = run_batch(
            batch(&library, FakeEnricher::new(dir.path()), JobKind::Covers),
            token,
        )
        .await;
        assert_eq!(summary.covers_saved, 1);
        let a = library.find_by_path("/dav/a.mp3").unwrap().unwrap();
        assert!(a.has_cover);
        assert!(!a.has_lyrics);
        assert_eq!(a.cover_mime, "image/jpeg");
    }

    #[tokio::test]
    async fn png_cover_is_detected_from_its_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::Covers, 1).unwrap();

        let client = FakeEnricher::new(dir.path()).cover_bytes(b"\x89PNG\r\n\x1a\n....");
        let summary = run_batch(batch(&library, client, JobKind::Covers), token).await;
        assert_eq!(summary.covers_saved, 1);
        let a = library.find_by_path("/dav/a.mp3").unwrap().unwrap();
        assert!(a.cover_path.ends_with(".jpg"));
        assert_eq!(a.cover_mime, "image/png");
    }

    #[test]
    fn cover_mime_falls_back_to_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("art.png");
        std::fs::write(&png, b"not really an image").unwrap();
        assert_eq!(saved_cover_mime(&png), "image/png");

        let jpeg = dir.path().join("art.bin");
        std::fs::write(&jpeg, b"\xff\xd8\xff\xdb").unwrap();
        assert_eq!(saved_cover_mime(&jpeg), "image/jpeg");

        assert_eq!(saved_cover_mime(&dir.path().join("gone.dat")), "image/jpeg");
    }

    #[tokio::test]
    async fn lyrics_batch_counts_each_track() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        library.upsert_scanned(scanned_track("/dav/b.mp3", "B", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::Lyrics, 2).unwrap();

        let client = FakeEnricher::new(dir.path()).without_title("B");
        let summary = run_batch(batch(&library, client, JobKind::Lyrics), token).await;

        assert_eq!(summary.total, 2);
        assert_eq!((summary.success, summary.failed), (1, 1));
        assert_eq!((summary.lyrics_saved, summary.covers_saved), (1, 0));
        let a = library.find_by_path("/dav/a.mp3").unwrap().unwrap();
        assert!(a.has_lyrics);
        assert!(!a.lyrics_path.is_empty());
        assert!(!a.has_cover);
        let b = library.find_by_path("/dav/b.mp3").unwrap().unwrap();
        assert!(!b.has_lyrics);
        assert!(b.lyrics_path.is_empty());

        let status = jobs.snapshot();
        assert_eq!(status.message, "Completed");
        assert_eq!((status.current, status.success, status.failed), (2, 1, 1));
    }

    #[tokio::test]
    async fn failed_store_write_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        let a = library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        library.upsert_scanned(scanned_track("/dav/b.mp3", "B", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::Lyrics, 2).unwrap();

        let job = batch(&library, FakeEnricher::new(dir.path()), JobKind::Lyrics);
        assert!(library.delete(&a.id).unwrap());
        let summary = run_batch(job, token).await;

        assert_eq!((summary.success, summary.failed), (1, 1));
        assert_eq!(summary.lyrics_saved, 1);
        assert!(library.get(&a.id).unwrap().is_none());
        assert!(library.find_by_path("/dav/b.mp3").unwrap().unwrap().has_lyrics);
        assert_eq!(jobs.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn every_item_failing_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        library.upsert_scanned(scanned_track("/dav/b.mp3", "B", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::Lyrics, 2).unwrap();

        let client = FakeEnricher::new(dir.path()).without_title("A").without_title("B");
        let summary = run_batch(batch(&library, client, JobKind::Lyrics), token).await;
        assert_eq!(summary.failed, 2);
        let status = jobs.snapshot();
        assert!(!status.running);
        assert_eq!(status.message, "Completed");
    }

    #[tokio::test]
    async fn cancel_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let library = open_library(&dir);
        library.upsert_scanned(scanned_track("/dav/a.mp3", "A", "Band")).unwrap();
        library.upsert_scanned(scanned_track("/dav/b.mp3", "B", "Band")).unwrap();
        let jobs = JobManager::new();
        let token = jobs.try_start(JobKind::Lyrics, 2).unwrap();
        jobs.cancel();

        let summary = run_batch(
            batch(&library, FakeEnricher::new(dir.path()), JobKind::Lyrics),
            token,
        )
        .await;
        assert!(summary.cancelled);
        assert_eq!(jobs.snapshot().message, "Cancelled");
    }
}
