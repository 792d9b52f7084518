use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{ScanStatus, TrackRecord};
use library::Library;
use metadata::{MetadataError, TagDecoder, TagInfo};
use parking_lot::RwLock;
use webdav::{RemoteFile, RemoteSource, WebDavError};

use crate::config::{ServerConfig, WebDavConfig};
use crate::external::{
    CatalogMatch, EnrichOutcome, EnrichRequest, EnrichmentClient, ExternalError, MetadataCatalog,
};
use crate::jobs::JobManager;
use crate::scan::SourceConnector;
use crate::state::AppState;

/// In-memory share: directory listings by path and file bodies by path.
#[derive(Clone, Default)]
pub struct FakeShare {
    pub dirs: HashMap<String, Vec<RemoteFile>>,
    pub files: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl RemoteSource for FakeShare {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteFile>, WebDavError> {
        self.dirs.get(path).cloned().ok_or_else(|| WebDavError::Status {
            status: 404,
            url: path.to_string(),
            body: String::new(),
        })
    }

    async fn fetch_file(&self, path: &str) -> Result<Bytes, WebDavError> {
        self.files
            .get(path)
            .map(|bytes| Bytes::from(bytes.clone()))
            .ok_or_else(|| WebDavError::Status {
                status: 500,
                url: path.to_string(),
                body: "gone".to_string(),
            })
    }
}

fn file(path: &str, size: u64) -> RemoteFile {
    RemoteFile {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        size,
        is_directory: false,
    }
}

fn dir(path: &str) -> RemoteFile {
    RemoteFile {
        is_directory: true,
        ..file(path, 0)
    }
}

/// `/dav` with `a.mp3`, an untagged `Band - Song B.mp3`, a cover image and
/// `sub/c.mp3`.
pub fn share() -> FakeShare {
    let size = 4_000_000;
    let mut share = FakeShare::default();
    share.dirs.insert(
        "/dav".to_string(),
        vec![
            file("/dav/a.mp3", size),
            file("/dav/Band - Song B.mp3", size),
            file("/dav/folder.jpg", 1_000),
            dir("/dav/sub"),
        ],
    );
    share
        .dirs
        .insert("/dav/sub".to_string(), vec![file("/dav/sub/c.mp3", size)]);
    share
        .files
        .insert("/dav/a.mp3".to_string(), b"Song A|Band".to_vec());
    share
        .files
        .insert("/dav/Band - Song B.mp3".to_string(), vec![0xde, 0xad, 0xbe, 0xef]);
    share
        .files
        .insert("/dav/sub/c.mp3".to_string(), b"Song C|Band".to_vec());
    share
}

/// Reads `title|artist` bodies; anything else fails to decode.
pub struct PipeDecoder;

impl TagDecoder for PipeDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TagInfo, MetadataError> {
        let text = std::str::from_utf8(bytes).ok();
        let Some((title, artist)) = text.and_then(|text| text.split_once('|')) else {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no tag",
            )));
        };
        Ok(TagInfo {
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            ..TagInfo::default()
        })
    }
}

/// Hands out a clone of `share`, or fails like a share rejecting the login.
pub struct FakeConnector {
    pub share: Option<FakeShare>,
}

impl SourceConnector for FakeConnector {
    fn connect(&self, config: &WebDavConfig) -> Result<Arc<dyn RemoteSource>, WebDavError> {
        match &self.share {
            Some(share) => Ok(Arc::new(share.clone())),
            None => Err(WebDavError::Status {
                status: 401,
                url: config.url.clone(),
                body: "Unauthorized".to_string(),
            }),
        }
    }
}

/// Writes small placeholder files for every request unless told otherwise.
pub struct FakeEnricher {
    dir: PathBuf,
    failing_cover: bool,
    cover: Vec<u8>,
    missing: HashSet<String>,
}

impl FakeEnricher {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            failing_cover: false,
            cover: b"\xff\xd8\xff\xe0jpeg".to_vec(),
            missing: HashSet::new(),
        }
    }

    /// Saves `bytes` as every cover, still under a `.jpg` name.
    pub fn cover_bytes(mut self, bytes: &[u8]) -> Self {
        self.cover = bytes.to_vec();
        self
    }

    pub fn failing_cover(mut self) -> Self {
        self.failing_cover = true;
        self
    }

    /// Nothing is found for tracks with this title.
    pub fn without_title(mut self, title: &str) -> Self {
        self.missing.insert(title.to_string());
        self
    }

    fn save(&self, request: &EnrichRequest, ext: &str, body: &[u8]) -> Result<PathBuf, String> {
        if self.missing.contains(&request.title) {
            return Err(format!("no {} found for {}", ext, request.title));
        }
        let path = self.dir.join(format!("{}.{}", common::stable_id(&request.title), ext));
        std::fs::write(&path, body).map_err(|err| err.to_string())?;
        Ok(path)
    }
}

#[async_trait]
impl EnrichmentClient for FakeEnricher {
    async fn fetch_and_save(&self, request: &EnrichRequest) -> EnrichOutcome {
        let lyrics = request
            .want_lyrics
            .then(|| self.save(request, "lrc", b"[00:01.00]first\n[00:04.50]second\n"));
        let cover = request.want_cover.then(|| {
            if self.failing_cover {
                Err("cover service unavailable".to_string())
            } else {
                self.save(request, "jpg", &self.cover)
            }
        });
        EnrichOutcome { lyrics, cover }
    }
}

pub struct FakeCatalog {
    pub found: Option<CatalogMatch>,
}

#[async_trait]
impl MetadataCatalog for FakeCatalog {
    async fn search_track(&self, artist: &str, title: &str) -> Result<CatalogMatch, ExternalError> {
        self.found
            .clone()
            .ok_or_else(|| ExternalError::NotFound(format!("{} - {}", artist, title)))
    }
}

pub fn scanned_track(path: &str, title: &str, artist: &str) -> TrackRecord {
    let name = path.rsplit('/').next().unwrap_or(path);
    let mut record = TrackRecord::new(path, name, 4_000_000);
    record.title = title.to_string();
    record.artist = artist.to_string();
    record.scan_status = ScanStatus::Success;
    record
}

/// State wired to fakes, with the config and index under `dir`.
pub fn test_state(dir: &Path, share: Option<FakeShare>) -> AppState {
    let mut config = ServerConfig::default();
    config.webdav.url = "http://nas.local:5005".to_string();
    config.webdav.username = "admin".to_string();
    config.webdav.password = "secret".to_string();
    config.enrichment.request_delay_ms = 1;
    AppState {
        config_path: dir.join("config.yaml"),
        config: Arc::new(RwLock::new(config)),
        library: Library::open(&dir.join("library.redb")).unwrap(),
        jobs: JobManager::new(),
        connector: Arc::new(FakeConnector { share }),
        decoder: Arc::new(PipeDecoder),
        enrichment: Arc::new(FakeEnricher::new(dir)),
        catalog: Arc::new(FakeCatalog {
            found: Some(CatalogMatch {
                title: "Catalog Title".to_string(),
                artist: "Catalog Artist".to_string(),
                album: "Catalog Album".to_string(),
                year: 1999,
            }),
        }),
    }
}
