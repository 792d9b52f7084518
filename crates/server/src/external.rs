use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

const NETEASE_BASE: &str = "https://music.163.com";
const ITUNES_BASE: &str = "https://itunes.apple.com";
const MUSICBRAINZ_BASE: &str = "https://musicbrainz.org";
const PROVIDER_USER_AGENT: &str = "Mozilla/5.0";
const VARIOUS_ARTISTS: &str = "Various Artists";

#[derive(Debug)]
pub enum ExternalError {
    Http(reqwest::Error),
    Status(u16),
    NotFound(String),
    Io(std::io::Error),
}

impl std::fmt::Display for ExternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalError::Http(err) => write!(f, "http error: {}", err),
            ExternalError::Status(status) => write!(f, "http {}", status),
            ExternalError::NotFound(what) => write!(f, "not found: {}", what),
            ExternalError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ExternalError {}

impl From<reqwest::Error> for ExternalError {
    fn from(err: reqwest::Error) -> Self {
        ExternalError::Http(err)
    }
}

impl From<std::io::Error> for ExternalError {
    fn from(err: std::io::Error) -> Self {
        ExternalError::Io(err)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnrichRequest {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub want_lyrics: bool,
    pub want_cover: bool,
}

/// Result per requested part; `None` when that part was not asked for.
#[derive(Debug, Default)]
pub struct EnrichOutcome {
    pub lyrics: Option<Result<PathBuf, String>>,
    pub cover: Option<Result<PathBuf, String>>,
}

impl EnrichOutcome {
    pub fn lyrics_path(&self) -> Option<&Path> {
        match self.lyrics.as_ref() {
            Some(Ok(path)) if !path.as_os_str().is_empty() => Some(path.as_path()),
            _ => None,
        }
    }

    pub fn cover_path(&self) -> Option<&Path> {
        match self.cover.as_ref() {
            Some(Ok(path)) if !path.as_os_str().is_empty() => Some(path.as_path()),
            _ => None,
        }
    }

    pub fn first_error(&self) -> Option<&str> {
        [self.lyrics.as_ref(), self.cover.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|result| result.as_ref().err().map(|err| err.as_str()))
    }
}

/// Looks up lyrics and cover art for a track and stores them locally.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn fetch_and_save(&self, request: &EnrichRequest) -> EnrichOutcome;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogMatch {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: u32,
}

#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn search_track(&self, artist: &str, title: &str) -> Result<CatalogMatch, ExternalError>;
}

/// Netease for lyrics and covers, iTunes as the cover fallback.
pub struct ProviderFetcher {
    client: Client,
    netease_base: String,
    itunes_base: String,
    lyrics_dir: PathBuf,
    covers_dir: PathBuf,
}

impl ProviderFetcher {
    pub fn new(timeout: Duration, lyrics_dir: PathBuf, covers_dir: PathBuf) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .user_agent(PROVIDER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            netease_base: NETEASE_BASE.to_string(),
            itunes_base: ITUNES_BASE.to_string(),
            lyrics_dir,
            covers_dir,
        })
    }

    pub fn with_endpoints(mut self, netease_base: &str, itunes_base: &str) -> Self {
        self.netease_base = netease_base.trim_end_matches('/').to_string();
        self.itunes_base = itunes_base.trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ExternalError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ExternalError::Status(response.status().as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    async fn search_songs(&self, term: &str) -> Result<Vec<NeteaseSong>, ExternalError> {
        let url = format!(
            "{}/api/search/get?type=1&s={}",
            self.netease_base,
            urlencoding::encode(term)
        );
        let payload: NeteaseSearchResponse = self.get_json(&url).await?;
        Ok(payload.result.and_then(|result| result.songs).unwrap_or_default())
    }

    async fn search_lyrics(&self, artist: &str, title: &str) -> Result<String, ExternalError> {
        let songs = self.search_songs(&format!("{} {}", title, artist)).await?;
        let song = songs
            .first()
            .ok_or_else(|| ExternalError::NotFound(format!("song {} - {}", artist, title)))?;
        let url = format!("{}/api/song/lyric?id={}&lv=1", self.netease_base, song.id);
        let payload: NeteaseLyricResponse = self.get_json(&url).await?;
        payload
            .lrc
            .and_then(|lrc| lrc.lyric)
            .filter(|lyric| !lyric.trim().is_empty())
            .ok_or_else(|| ExternalError::NotFound(format!("lyrics {} - {}", artist, title)))
    }

    async fn search_cover(&self, artist: &str, album: &str) -> Result<Vec<u8>, ExternalError> {
        for term in cover_search_terms(artist, album) {
            match self.netease_cover(&term).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => info!("Netease cover lookup for '{}' failed: {}", term, err),
            }
        }
        self.itunes_cover(artist, album).await
    }

    async fn netease_cover(&self, term: &str) -> Result<Vec<u8>, ExternalError> {
        let songs = self.search_songs(term).await?;
        for song in songs {
            let pic_url = match song.album.and_then(|album| album.pic_url) {
                Some(url) if !url.is_empty() && !url.contains("default_album") => url,
                _ => continue,
            };
            let pic_url = pic_url.replacen("http://", "https://", 1);
            match self.download(&pic_url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => warn!("Cover download from {} failed: {}", pic_url, err),
            }
        }
        Err(ExternalError::NotFound(format!("cover for {}", term)))
    }

    async fn itunes_cover(&self, artist: &str, album: &str) -> Result<Vec<u8>, ExternalError> {
        let url = format!(
            "{}/search?term={}&media=music&limit=1",
            self.itunes_base,
            urlencoding::encode(&format!("{} {}", album, artist))
        );
        let payload: ItunesSearchResponse = self.get_json(&url).await?;
        let artwork = payload
            .results
            .into_iter()
            .find_map(|result| result.artwork_url_100)
            .ok_or_else(|| ExternalError::NotFound(format!("itunes cover for {} {}", album, artist)))?;
        let artwork = artwork.replacen("100x100bb", "600x600bb", 1);
        self.download(&artwork).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ExternalError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ExternalError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ExternalError::NotFound(format!("empty body from {}", url)));
        }
        Ok(bytes.to_vec())
    }

    async fn fetch_lyrics(&self, artist: &str, title: &str) -> Result<PathBuf, String> {
        if artist.is_empty() || title.is_empty() {
            return Err("artist and title are required for lyrics".to_string());
        }
        let content = self
            .search_lyrics(artist, title)
            .await
            .map_err(|err| err.to_string())?;
        let path = self.lyrics_dir.join(format!("{}.lrc", file_key(artist, title)));
        save_file(&path, content.as_bytes())
            .await
            .map_err(|err| format!("lyrics save failed: {}", err))?;
        info!("Lyrics saved: {:?}", path);
        Ok(path)
    }

    async fn fetch_cover(&self, artist: &str, title: &str, album: &str) -> Result<PathBuf, String> {
        let artist = if artist.is_empty() { VARIOUS_ARTISTS } else { artist };
        let album = if album.is_empty() { title } else { album };
        let bytes = self
            .search_cover(artist, album)
            .await
            .map_err(|err| err.to_string())?;
        let path = self.covers_dir.join(format!("{}.jpg", file_key(artist, album)));
        save_file(&path, &bytes)
            .await
            .map_err(|err| format!("cover save failed: {}", err))?;
        info!("Cover saved: {:?} ({} bytes)", path, bytes.len());
        Ok(path)
    }
}

#[async_trait]
impl EnrichmentClient for ProviderFetcher {
    async fn fetch_and_save(&self, request: &EnrichRequest) -> EnrichOutcome {
        let mut outcome = EnrichOutcome::default();
        if request.want_lyrics {
            outcome.lyrics = Some(self.fetch_lyrics(&request.artist, &request.title).await);
        }
        if request.want_cover {
            outcome.cover = Some(
                self.fetch_cover(&request.artist, &request.title, &request.album)
                    .await,
            );
        }
        outcome
    }
}

/// Netease search terms for a cover, most specific first.
fn cover_search_terms(artist: &str, album: &str) -> Vec<String> {
    let mut terms = Vec::new();
    if !album.is_empty() && !artist.is_empty() {
        terms.push(format!("{} {}", album, artist));
    }
    if !album.is_empty() {
        terms.push(album.to_string());
    }
    if !artist.is_empty() && artist != VARIOUS_ARTISTS {
        terms.push(artist.to_string());
    }
    terms
}

fn file_key(artist: &str, name: &str) -> String {
    common::stable_id(&format!("{} - {}", artist, name))
}

async fn save_file(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

#[derive(Deserialize)]
struct NeteaseSearchResponse {
    result: Option<NeteaseSearchResult>,
}

#[derive(Deserialize)]
struct NeteaseSearchResult {
    songs: Option<Vec<NeteaseSong>>,
}

#[derive(Deserialize)]
struct NeteaseSong {
    id: u64,
    album: Option<NeteaseAlbum>,
}

#[derive(Deserialize)]
struct NeteaseAlbum {
    #[serde(rename = "picUrl")]
    pic_url: Option<String>,
}

#[derive(Deserialize)]
struct NeteaseLyricResponse {
    lrc: Option<NeteaseLyric>,
}

#[derive(Deserialize)]
struct NeteaseLyric {
    lyric: Option<String>,
}

#[derive(Deserialize)]
struct ItunesSearchResponse {
    #[serde(default)]
    results: Vec<ItunesResult>,
}

#[derive(Deserialize)]
struct ItunesResult {
    #[serde(rename = "artworkUrl100")]
    artwork_url_100: Option<String>,
}

pub struct MusicBrainz {
    client: Client,
    base: String,
    user_agent: String,
}

impl MusicBrainz {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ExternalError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: MUSICBRAINZ_BASE.to_string(),
            user_agent: user_agent.trim().to_string(),
        })
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MetadataCatalog for MusicBrainz {
    async fn search_track(&self, artist: &str, title: &str) -> Result<CatalogMatch, ExternalError> {
        if artist.is_empty() && title.is_empty() {
            return Err(ExternalError::NotFound("empty query".to_string()));
        }
        let query = format!("artist:\"{}\" AND recording:\"{}\"", artist, title);
        let url = format!(
            "{}/ws/2/recording/?query={}&fmt=json&limit=5",
            self.base,
            urlencoding::encode(&query)
        );
        let response = self
            .client
            .get(&url)
            .header("User-Agent", self.user_agent.as_str())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExternalError::Status(response.status().as_u16()));
        }
        let payload = response.json::<MusicBrainzRecordingResponse>().await?;
        let recording = payload
            .recordings
            .into_iter()
            .next()
            .ok_or_else(|| ExternalError::NotFound(format!("recording {} - {}", artist, title)))?;

        let mut found = CatalogMatch {
            title: recording.title.unwrap_or_default(),
            ..CatalogMatch::default()
        };
        if let Some(credit) = recording.artist_credit.into_iter().next() {
            found.artist = credit.name;
        }
        if let Some(release) = recording.releases.into_iter().next() {
            found.album = release.title.unwrap_or_default();
            found.year = release
                .date
                .as_deref()
                .and_then(|date| date.get(..4))
                .and_then(|year| year.parse().ok())
                .unwrap_or(0);
        }
        Ok(found)
    }
}

#[derive(Deserialize)]
struct MusicBrainzRecordingResponse {
    #[serde(default)]
    recordings: Vec<MusicBrainzRecording>,
}

#[derive(Deserialize)]
struct MusicBrainzRecording {
    title: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MusicBrainzCredit>,
    #[serde(default)]
    releases: Vec<MusicBrainzRelease>,
}

#[derive(Deserialize)]
struct MusicBrainzCredit {
    name: String,
}

#[derive(Deserialize)]
struct MusicBrainzRelease {
    title: Option<String>,
    date: Option<String>,
}
