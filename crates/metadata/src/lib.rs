mod extract;
mod lyrics;

use std::io::Cursor;

use lofty::error::LoftyError;
use lofty::file::FileType;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Tag;

pub use extract::{estimate_bit_rate, estimate_duration, extract, parse_file_name, FileNameInfo};
pub use lyrics::{parse_lrc, LyricLine};

/// Everything the decoder could read from a file's bytes. Absent values stay `None`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub comment: Option<String>,
    pub picture_mime: Option<String>,
    pub has_embedded_cover: bool,
    pub duration_secs: Option<u32>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Turns raw audio bytes into tag metadata.
pub trait TagDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<TagInfo, MetadataError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyDecoder;

impl TagDecoder for LoftyDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TagInfo, MetadataError> {
        read_tags_from_bytes(bytes)
    }
}

pub fn read_tags_from_bytes(bytes: &[u8]) -> Result<TagInfo, MetadataError> {
    let tagged_file = Probe::new(Cursor::new(bytes)).guess_file_type()?.read()?;
    let properties = tagged_file.properties();

    let mut info = TagInfo {
        format: Some(format_label(tagged_file.file_type())),
        ..TagInfo::default()
    };

    let duration_secs = properties.duration().as_secs();
    if duration_secs > 0 {
        info.duration_secs = Some(duration_secs.min(u64::from(u32::MAX)) as u32);
    }
    info.sample_rate = properties.sample_rate().filter(|rate| *rate > 0);
    info.bitrate_kbps = properties
        .audio_bitrate()
        .or(properties.overall_bitrate())
        .filter(|rate| *rate > 0);

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = text_item(tag, &ItemKey::TrackTitle);
        info.artist = text_item(tag, &ItemKey::TrackArtist);
        info.album = text_item(tag, &ItemKey::AlbumTitle);
        info.album_artist = text_item(tag, &ItemKey::AlbumArtist);
        info.composer = text_item(tag, &ItemKey::Composer);
        info.genre = text_item(tag, &ItemKey::Genre);
        info.comment = text_item(tag, &ItemKey::Comment);
        info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_number);
        info.disc_no = tag.get_string(&ItemKey::DiscNumber).and_then(parse_number);
        info.year = tag
            .get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(parse_year);
        if let Some(picture) = pick_picture(tag.pictures()) {
            info.has_embedded_cover = true;
            info.picture_mime = sniff_image_mime(picture.data())
                .or_else(|| picture.mime_type().map(|mime| mime.as_str().to_string()));
        }
    }

    Ok(info)
}

fn text_item(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

fn format_label(file_type: FileType) -> String {
    match file_type {
        FileType::Mpeg => "MP3".to_string(),
        other => format!("{:?}", other).to_ascii_uppercase(),
    }
}

fn parse_number(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok().filter(|value| *value > 0)
}

fn parse_year(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

/// JPEG or PNG, going by the leading magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else {
        None
    }
}
