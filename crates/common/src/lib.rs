use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One audio file on the remote share, keyed by `file_path`.
///
/// Descriptive fields default to empty strings / zero when a tag is absent.
/// `id` is always `stable_id(file_path)`, so a path maps to exactly one record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_artist: String,
    #[serde(default)]
    pub composer: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub year: u32,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub comment: String,
    /// Seconds.
    #[serde(default)]
    pub duration: u32,
    /// kbps.
    #[serde(default)]
    pub bit_rate: u32,
    /// Hz.
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub has_lyrics: bool,
    #[serde(default)]
    pub has_cover: bool,
    #[serde(default)]
    pub cover_mime: String,
    /// Local file written by lyric enrichment, empty when none.
    #[serde(default)]
    pub lyrics_path: String,
    /// Local file written by cover enrichment, empty when the cover is only embedded.
    #[serde(default)]
    pub cover_path: String,
    #[serde(default)]
    pub scan_status: ScanStatus,
    #[serde(default)]
    pub scan_error: String,
    #[serde(default)]
    pub scanned_at: Option<u64>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl TrackRecord {
    pub fn new(file_path: &str, file_name: &str, file_size: u64) -> Self {
        Self {
            id: stable_id(file_path),
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
            file_size,
            ..Self::default()
        }
    }

    /// A record for a file whose bytes could not be retrieved.
    pub fn failed(file_path: &str, file_name: &str, file_size: u64, error: &str) -> Self {
        let mut record = Self::new(file_path, file_name, file_size);
        record.scan_status = ScanStatus::Failed;
        record.scan_error = error.to_string();
        record.scanned_at = Some(now_secs());
        record
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Success => "success",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ScanStatus::Pending),
            "success" => Some(ScanStatus::Success),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

/// One line of a synchronization run's audit trail. Never mutated once stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanLogEntry {
    pub id: u64,
    pub task_id: String,
    pub message: String,
    pub level: LogLevel,
    pub created_at: u64,
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

pub fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
