use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{now_secs, LogLevel, ScanLogEntry, ScanStatus, TrackRecord};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TableHandle, TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::info;

const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const TRACKS_BY_PATH_TABLE: TableDefinition<&str, &str> = TableDefinition::new("tracks_by_path");
const SCAN_LOGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("scan_logs");
const TOP_LIMIT: usize = 10;

#[derive(Clone)]
pub struct Library {
    db: Arc<Database>,
}

/// Conjunctive filter for `Library::query`. Text fields match as
/// case-insensitive substrings; `keyword` checks title, artist, album and
/// file name.
#[derive(Clone, Debug, Default)]
pub struct TrackFilter {
    pub keyword: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub status: Option<ScanStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NameCount {
    pub name: String,
    pub count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryStatistics {
    pub total: usize,
    pub with_lyrics: usize,
    pub with_cover: usize,
    pub failed: usize,
    pub top_artists: Vec<NameCount>,
    pub top_albums: Vec<NameCount>,
    pub top_genres: Vec<NameCount>,
}

impl Library {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        let db = open_or_create_db(path)?;
        info!("Opened index at {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }

    pub fn with_db(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, id: &str) -> Result<Option<TrackRecord>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let found = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(found)
    }

    pub fn find_by_path(&self, file_path: &str) -> Result<Option<TrackRecord>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let paths = match read_txn.open_table(TRACKS_BY_PATH_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let id = match paths.get(file_path)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let found = match tracks.get(id.as_str())? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(found)
    }

    /// Inserts or updates the record for `record.file_path` from a fresh
    /// scan. On update, `created_at` and enrichment results are carried over;
    /// an embedded cover found by the new scan replaces the stored cover flag.
    pub fn upsert_scanned(&self, mut record: TrackRecord) -> Result<TrackRecord, LibraryError> {
        let now = now_secs();
        let write_txn = self.db.begin_write()?;
        {
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let existing: Option<TrackRecord> = match tracks.get(record.id.as_str())? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            match existing {
                Some(existing) => {
                    record.created_at = existing.created_at;
                    record.has_lyrics = existing.has_lyrics;
                    record.lyrics_path = existing.lyrics_path;
                    if !record.has_cover {
                        record.has_cover = existing.has_cover;
                        record.cover_mime = existing.cover_mime;
                    }
                    record.cover_path = existing.cover_path;
                }
                None => record.created_at = now,
            }
            record.updated_at = now;
            let bytes = encode_value(&record)?;
            tracks.insert(record.id.as_str(), bytes.as_slice())?;
            let mut paths = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            paths.insert(record.file_path.as_str(), record.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Marks the record for `file_path` as failed, creating it when absent.
    /// Fields from an earlier successful scan are kept.
    pub fn upsert_failed(
        &self,
        file_path: &str,
        file_name: &str,
        file_size: u64,
        error: &str,
    ) -> Result<TrackRecord, LibraryError> {
        let now = now_secs();
        let mut record = TrackRecord::failed(file_path, file_name, file_size, error);
        let write_txn = self.db.begin_write()?;
        {
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let existing: Option<TrackRecord> = match tracks.get(record.id.as_str())? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            if let Some(mut existing) = existing {
                existing.file_name = record.file_name;
                existing.file_size = record.file_size;
                existing.scan_status = ScanStatus::Failed;
                existing.scan_error = record.scan_error;
                existing.scanned_at = record.scanned_at;
                record = existing;
            } else {
                record.created_at = now;
            }
            record.updated_at = now;
            let bytes = encode_value(&record)?;
            tracks.insert(record.id.as_str(), bytes.as_slice())?;
            let mut paths = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            paths.insert(record.file_path.as_str(), record.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Applies `change` to the stored record and bumps `updated_at`.
    /// Identity fields cannot be changed this way.
    pub fn update<F>(&self, id: &str, change: F) -> Result<Option<TrackRecord>, LibraryError>
    where
        F: FnOnce(&mut TrackRecord),
    {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let existing: Option<TrackRecord> = match tracks.get(id)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            match existing {
                Some(mut record) => {
                    let (record_id, file_path, created_at) =
                        (record.id.clone(), record.file_path.clone(), record.created_at);
                    change(&mut record);
                    record.id = record_id;
                    record.file_path = file_path;
                    record.created_at = created_at;
                    record.updated_at = now_secs();
                    let bytes = encode_value(&record)?;
                    tracks.insert(id, bytes.as_slice())?;
                    Some(record)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<bool, LibraryError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let removed: Option<TrackRecord> = match tracks.remove(id)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            if let Some(record) = removed.as_ref() {
                let mut paths = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
                paths.remove(record.file_path.as_str())?;
            }
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Removes every track. Scan logs are kept.
    pub fn delete_all(&self) -> Result<usize, LibraryError> {
        let write_txn = self.db.begin_write()?;
        let count = {
            let tracks = write_txn.open_table(TRACKS_TABLE)?;
            tracks.len()? as usize
        };
        clear_table(&write_txn, TRACKS_TABLE)?;
        clear_table(&write_txn, TRACKS_BY_PATH_TABLE)?;
        write_txn.commit()?;
        Ok(count)
    }

    /// Filtered page of tracks ordered by file path, plus the total match count.
    pub fn query(
        &self,
        filter: &TrackFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TrackRecord>, usize), LibraryError> {
        let matcher = FilterMatcher::new(filter);
        let mut total = 0usize;
        let mut items = Vec::new();
        self.for_each_by_path(|record| {
            if !matcher.matches(&record) {
                return;
            }
            total += 1;
            if total <= offset || items.len() >= limit {
                return;
            }
            items.push(record);
        })?;
        Ok((items, total))
    }

    /// All tracks accepted by `predicate`, ordered by file path.
    pub fn list_where<P>(&self, predicate: P) -> Result<Vec<TrackRecord>, LibraryError>
    where
        P: Fn(&TrackRecord) -> bool,
    {
        let mut items = Vec::new();
        self.for_each_by_path(|record| {
            if predicate(&record) {
                items.push(record);
            }
        })?;
        Ok(items)
    }

    pub fn statistics(&self) -> Result<LibraryStatistics, LibraryError> {
        let mut stats = LibraryStatistics::default();
        let mut artists: HashMap<String, usize> = HashMap::new();
        let mut albums: HashMap<String, usize> = HashMap::new();
        let mut genres: HashMap<String, usize> = HashMap::new();
        self.for_each_by_path(|record| {
            stats.total += 1;
            if record.has_lyrics {
                stats.with_lyrics += 1;
            }
            if record.has_cover {
                stats.with_cover += 1;
            }
            if record.scan_status == ScanStatus::Failed {
                stats.failed += 1;
            }
            bump(&mut artists, record.artist);
            bump(&mut albums, record.album);
            bump(&mut genres, record.genre);
        })?;
        stats.top_artists = top_counts(artists);
        stats.top_albums = top_counts(albums);
        stats.top_genres = top_counts(genres);
        Ok(stats)
    }

    /// Appends a log line; ids increase monotonically across all tasks.
    pub fn append_log(
        &self,
        task_id: &str,
        level: LogLevel,
        message: &str,
    ) -> Result<ScanLogEntry, LibraryError> {
        let write_txn = self.db.begin_write()?;
        let entry = {
            let mut table = write_txn.open_table(SCAN_LOGS_TABLE)?;
            let id = table.last()?.map(|(key, _)| key.value() + 1).unwrap_or(1);
            let entry = ScanLogEntry {
                id,
                task_id: task_id.to_string(),
                message: message.to_string(),
                level,
                created_at: now_secs(),
            };
            let bytes = encode_value(&entry)?;
            table.insert(id, bytes.as_slice())?;
            entry
        };
        write_txn.commit()?;
        Ok(entry)
    }

    /// Log page, newest first, optionally restricted to one task.
    pub fn list_logs(
        &self,
        task_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ScanLogEntry>, usize), LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SCAN_LOGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok((Vec::new(), 0)),
            Err(err) => return Err(err.into()),
        };

        let Some(task_id) = task_id else {
            let total = table.len()? as usize;
            let mut items: Vec<ScanLogEntry> = Vec::new();
            for entry in table.iter()?.rev().skip(offset).take(limit) {
                items.push(decode_value(entry?.1.value())?);
            }
            return Ok((items, total));
        };

        let mut total = 0usize;
        let mut items = Vec::new();
        for entry in table.iter()?.rev() {
            let entry = entry?;
            let log: ScanLogEntry = decode_value(entry.1.value())?;
            if log.task_id != task_id {
                continue;
            }
            total += 1;
            if total <= offset || items.len() >= limit {
                continue;
            }
            items.push(log);
        }
        Ok((items, total))
    }

    /// Newest log line, stopping at the first match.
    pub fn last_log(&self, task_id: Option<&str>) -> Result<Option<ScanLogEntry>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SCAN_LOGS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        for entry in table.iter()?.rev() {
            let log: ScanLogEntry = decode_value(entry?.1.value())?;
            if task_id.map_or(true, |task_id| log.task_id == task_id) {
                return Ok(Some(log));
            }
        }
        Ok(None)
    }

    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    fn for_each_by_path<F>(&self, mut visit: F) -> Result<(), LibraryError>
    where
        F: FnMut(TrackRecord),
    {
        let read_txn = self.db.begin_read()?;
        let paths = match read_txn.open_table(TRACKS_BY_PATH_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        for entry in paths.iter()? {
            let entry = entry?;
            let id = entry.1.value();
            if let Some(value) = tracks.get(id)? {
                visit(decode_value(value.value())?);
            }
        }
        Ok(())
    }
}

struct FilterMatcher {
    keyword: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    genre: Option<String>,
    status: Option<ScanStatus>,
}

impl FilterMatcher {
    fn new(filter: &TrackFilter) -> Self {
        let normalize = |value: &Option<String>| {
            value
                .as_deref()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(|value| value.to_lowercase())
        };
        Self {
            keyword: normalize(&filter.keyword),
            title: normalize(&filter.title),
            artist: normalize(&filter.artist),
            album: normalize(&filter.album),
            genre: normalize(&filter.genre),
            status: filter.status,
        }
    }

    fn matches(&self, record: &TrackRecord) -> bool {
        let contains = |field: &str, needle: &Option<String>| match needle {
            Some(needle) => field.to_lowercase().contains(needle.as_str()),
            None => true,
        };
        if let Some(status) = self.status {
            if record.scan_status != status {
                return false;
            }
        }
        if let Some(keyword) = self.keyword.as_ref() {
            let hit = [&record.title, &record.artist, &record.album, &record.file_name]
                .iter()
                .any(|field| field.to_lowercase().contains(keyword.as_str()));
            if !hit {
                return false;
            }
        }
        contains(&record.title, &self.title)
            && contains(&record.artist, &self.artist)
            && contains(&record.album, &self.album)
            && contains(&record.genre, &self.genre)
    }
}

fn bump(counts: &mut HashMap<String, usize>, name: String) {
    let name = name.trim().to_string();
    if name.is_empty() {
        return;
    }
    *counts.entry(name).or_insert(0) += 1;
}

fn top_counts(counts: HashMap<String, usize>) -> Vec<NameCount> {
    let mut items: Vec<NameCount> = counts
        .into_iter()
        .map(|(name, count)| NameCount { name, count })
        .collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    items.truncate(TOP_LIMIT);
    items
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, LibraryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn clear_table(txn: &WriteTransaction, table: impl TableHandle) -> Result<(), LibraryError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::open(&dir.path().join("index.redb")).unwrap();
        (dir, library)
    }

    fn scanned(path: &str, title: &str, artist: &str) -> TrackRecord {
        let name = path.rsplit('/').next().unwrap_or(path);
        let mut record = TrackRecord::new(path, name, 1000);
        record.title = title.to_string();
        record.artist = artist.to_string();
        record.scan_status = ScanStatus::Success;
        record
    }

    #[test]
    fn empty_store_reads_cleanly() {
        let (_dir, library) = open_temp();
        assert!(library.get("missing").unwrap().is_none());
        assert!(library.find_by_path("/dav/a.mp3").unwrap().is_none());
        assert_eq!(library.query(&TrackFilter::default(), 20, 0).unwrap().1, 0);
        assert!(library.last_log(None).unwrap().is_none());
        assert_eq!(library.delete_all().unwrap(), 0);
    }

    #[test]
    fn rescanning_a_path_updates_in_place() {
        let (_dir, library) = open_temp();
        let first = library.upsert_scanned(scanned("/dav/a.mp3", "Old", "Band")).unwrap();
        library
            .update(&first.id, |record| {
                record.has_lyrics = true;
                record.lyrics_path = "/data/lyrics/x.lrc".to_string();
                record.has_cover = true;
                record.cover_mime = "image/jpeg".to_string();
            })
            .unwrap();

        let second = library.upsert_scanned(scanned("/dav/a.mp3", "New", "Band")).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.title, "New");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.has_lyrics);
        assert!(second.has_cover);
        assert_eq!(second.lyrics_path, "/data/lyrics/x.lrc");

        let (items, total) = library.query(&TrackFilter::default(), 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].title, "New");
    }

    #[test]
    fn failed_fetch_keeps_known_fields() {
        let (_dir, library) = open_temp();
        library.upsert_scanned(scanned("/dav/a.mp3", "Song", "Band")).unwrap();
        let failed = library
            .upsert_failed("/dav/a.mp3", "a.mp3", 2000, "status 500")
            .unwrap();
        assert_eq!(failed.scan_status, ScanStatus::Failed);
        assert_eq!(failed.scan_error, "status 500");
        assert_eq!(failed.title, "Song");
        assert_eq!(failed.file_size, 2000);

        let fresh = library.upsert_failed("/dav/b.mp3", "b.mp3", 5, "timeout").unwrap();
        assert_eq!(fresh.title, "");
        assert!(fresh.created_at > 0);
        assert!(library.find_by_path("/dav/b.mp3").unwrap().is_some());
    }

    #[test]
    fn query_filters_and_paginates_by_path() {
        let (_dir, library) = open_temp();
        library.upsert_scanned(scanned("/dav/c.mp3", "Gamma", "Band")).unwrap();
        library.upsert_scanned(scanned("/dav/a.mp3", "Alpha", "Band")).unwrap();
        library.upsert_scanned(scanned("/dav/b.mp3", "Beta", "Solo")).unwrap();
        library.upsert_failed("/dav/d.mp3", "d.mp3", 1, "boom").unwrap();

        let (page, total) = library.query(&TrackFilter::default(), 2, 1).unwrap();
        assert_eq!(total, 4);
        let paths: Vec<&str> = page.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/dav/b.mp3", "/dav/c.mp3"]);

        let band = TrackFilter {
            artist: Some("band".to_string()),
            ..TrackFilter::default()
        };
        assert_eq!(library.query(&band, 20, 0).unwrap().1, 2);

        let keyword = TrackFilter {
            keyword: Some("D.MP3".to_string()),
            ..TrackFilter::default()
        };
        assert_eq!(library.query(&keyword, 20, 0).unwrap().1, 1);

        let failed = TrackFilter {
            status: Some(ScanStatus::Failed),
            ..TrackFilter::default()
        };
        assert_eq!(library.query(&failed, 20, 0).unwrap().0[0].file_path, "/dav/d.mp3");
    }

    #[test]
    fn update_cannot_move_identity() {
        let (_dir, library) = open_temp();
        let record = library.upsert_scanned(scanned("/dav/a.mp3", "Song", "Band")).unwrap();
        let updated = library
            .update(&record.id, |record| {
                record.file_path = "/elsewhere.mp3".to_string();
                record.genre = "Rock".to_string();
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.file_path, "/dav/a.mp3");
        assert_eq!(updated.genre, "Rock");
        assert!(library.update("missing", |_| {}).unwrap().is_none());
    }

    #[test]
    fn delete_removes_path_index() {
        let (_dir, library) = open_temp();
        let record = library.upsert_scanned(scanned("/dav/a.mp3", "Song", "Band")).unwrap();
        library.upsert_scanned(scanned("/dav/b.mp3", "Other", "Band")).unwrap();
        assert!(library.delete(&record.id).unwrap());
        assert!(!library.delete(&record.id).unwrap());
        assert!(library.find_by_path("/dav/a.mp3").unwrap().is_none());
        assert_eq!(library.delete_all().unwrap(), 1);
        assert_eq!(library.query(&TrackFilter::default(), 20, 0).unwrap().1, 0);
    }

    #[test]
    fn statistics_count_flags_and_top_names() {
        let (_dir, library) = open_temp();
        let mut a = scanned("/dav/a.mp3", "A", "Band");
        a.has_lyrics = true;
        a.genre = "Rock".to_string();
        library.upsert_scanned(a).unwrap();
        let mut b = scanned("/dav/b.mp3", "B", "Band");
        b.has_cover = true;
        library.upsert_scanned(b).unwrap();
        library.upsert_scanned(scanned("/dav/c.mp3", "C", "Solo")).unwrap();
        library.upsert_failed("/dav/d.mp3", "d.mp3", 1, "boom").unwrap();

        let stats = library.statistics().unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.with_lyrics, 1);
        assert_eq!(stats.with_cover, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(
            stats.top_artists,
            vec![
                NameCount { name: "Band".to_string(), count: 2 },
                NameCount { name: "Solo".to_string(), count: 1 },
            ]
        );
        assert_eq!(stats.top_genres.len(), 1);
        assert!(stats.top_albums.is_empty());
    }

    #[test]
    fn logs_are_append_only_and_newest_first() {
        let (_dir, library) = open_temp();
        library.append_log("t1", LogLevel::Info, "Scan started").unwrap();
        library.append_log("t2", LogLevel::Info, "other").unwrap();
        let last = library.append_log("t1", LogLevel::Error, "Failed").unwrap();
        assert_eq!(last.id, 3);

        let (items, total) = library.list_logs(Some("t1"), 10, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].message, "Failed");
        assert_eq!(items[1].message, "Scan started");

        let (all, total) = library.list_logs(None, 1, 1).unwrap();
        assert_eq!(total, 3);
        assert_eq!(all[0].message, "other");

        assert_eq!(library.last_log(Some("t2")).unwrap().unwrap().message, "other");
        assert_eq!(library.last_log(None).unwrap().unwrap().id, 3);
        assert!(library.last_log(Some("t3")).unwrap().is_none());
    }

    #[test]
    fn unfiltered_log_pages_skip_and_stop() {
        let (_dir, library) = open_temp();
        for n in 1..=5 {
            library
                .append_log("t1", LogLevel::Info, &format!("line {}", n))
                .unwrap();
        }
        let (items, total) = library.list_logs(None, 2, 1).unwrap();
        assert_eq!(total, 5);
        let ids: Vec<u64> = items.iter().map(|log| log.id).collect();
        assert_eq!(ids, vec![4, 3]);

        let (tail, _) = library.list_logs(None, 10, 4).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message, "line 1");
    }
}


