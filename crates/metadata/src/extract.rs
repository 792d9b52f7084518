use std::path::Path;

use common::{now_secs, ScanStatus, TrackRecord};

use crate::{TagDecoder, TagInfo};

const SMALL_FILE: u64 = 3_000_000;
const MEDIUM_FILE: u64 = 5_000_000;
const LARGE_FILE: u64 = 8_000_000;

/// Builds a track record from downloaded bytes. Decoder failures fall back
/// to the size estimate and the file name, so this never fails.
pub fn extract(
    decoder: &dyn TagDecoder,
    bytes: &[u8],
    file_path: &str,
    file_name: &str,
    file_size: u64,
) -> TrackRecord {
    let mut record = TrackRecord::new(file_path, file_name, file_size);
    record.scan_status = ScanStatus::Success;
    record.scanned_at = Some(now_secs());
    record.format = extension_label(file_name);

    let info = match decoder.decode(bytes) {
        Ok(info) => info,
        Err(err) => {
            tracing::debug!("tag decode failed for {}: {}", file_path, err);
            TagInfo::default()
        }
    };
    apply_tags(&mut record, &info);

    match (info.duration_secs, info.bitrate_kbps) {
        (Some(duration), Some(bit_rate)) => {
            record.duration = duration;
            record.bit_rate = bit_rate;
        }
        (Some(duration), None) => {
            record.duration = duration;
            record.bit_rate = estimate_bit_rate(file_size);
        }
        _ => {
            record.bit_rate = info
                .bitrate_kbps
                .unwrap_or_else(|| estimate_bit_rate(file_size));
            record.duration = estimate_duration(file_size, record.bit_rate);
        }
    }
    record.sample_rate = info.sample_rate.unwrap_or(0);

    if record.title.is_empty() {
        let parsed = parse_file_name(file_name);
        record.title = parsed.title;
        if record.artist.is_empty() {
            if let Some(artist) = parsed.artist {
                record.artist = artist;
            }
        }
    }

    record
}

fn apply_tags(record: &mut TrackRecord, info: &TagInfo) {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    record.title = text(&info.title);
    record.artist = text(&info.artist);
    record.album = text(&info.album);
    record.album_artist = text(&info.album_artist);
    record.composer = text(&info.composer);
    record.genre = text(&info.genre);
    record.comment = text(&info.comment);
    record.year = info.year.unwrap_or(0);
    record.track_number = info.track_no.unwrap_or(0);
    record.disc_number = info.disc_no.unwrap_or(0);
    if info.has_embedded_cover {
        record.has_cover = true;
        record.cover_mime = info
            .picture_mime
            .clone()
            .unwrap_or_else(|| "image/jpeg".to_string());
    }
    if let Some(format) = info.format.as_ref() {
        record.format = format.clone();
    }
}

fn extension_label(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_uppercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "MP3".to_string())
}

/// Bitrate in kbps guessed from the file size alone.
pub fn estimate_bit_rate(file_size: u64) -> u32 {
    if file_size < SMALL_FILE {
        128
    } else if file_size < MEDIUM_FILE {
        192
    } else if file_size < LARGE_FILE {
        256
    } else {
        320
    }
}

/// Seconds of audio for `file_size` bytes at `bit_rate` kbps.
pub fn estimate_duration(file_size: u64, bit_rate: u32) -> u32 {
    if bit_rate == 0 {
        return 0;
    }
    let seconds = file_size.saturating_mul(8) / (u64::from(bit_rate) * 1000);
    seconds.min(u64::from(u32::MAX)) as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameInfo {
    pub title: String,
    pub artist: Option<String>,
}

/// Reads "NN. Artist - Title.ext" style names. Without a " - " separator
/// the whole cleaned stem becomes the title.
pub fn parse_file_name(file_name: &str) -> FileNameInfo {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(base);
    let cleaned = strip_track_prefix(stem).trim();
    let fallback = if cleaned.is_empty() { stem.trim() } else { cleaned };

    if let Some((artist, title)) = fallback.split_once(" - ") {
        let artist = artist.trim();
        let title = title.trim();
        if !title.is_empty() {
            return FileNameInfo {
                title: title.to_string(),
                artist: Some(artist.to_string()).filter(|artist| !artist.is_empty()),
            };
        }
    }

    FileNameInfo {
        title: fallback.to_string(),
        artist: None,
    }
}

fn strip_track_prefix(name: &str) -> &str {
    let rest = name.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == name.len() {
        return name;
    }
    let stripped = rest.trim_start_matches(|c: char| c == '.' || c == '-' || c.is_whitespace());
    if stripped.len() == rest.len() {
        return name;
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataError;

    struct FixedDecoder(Result<TagInfo, ()>);

    impl TagDecoder for FixedDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<TagInfo, MetadataError> {
            self.0.clone().map_err(|_| {
                MetadataError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "no tags",
                ))
            })
        }
    }

    #[test]
    fn bit_rate_steps_with_size() {
        assert_eq!(estimate_bit_rate(0), 128);
        assert_eq!(estimate_bit_rate(2_999_999), 128);
        assert_eq!(estimate_bit_rate(3_000_000), 192);
        assert_eq!(estimate_bit_rate(4_999_999), 192);
        assert_eq!(estimate_bit_rate(5_000_000), 256);
        assert_eq!(estimate_bit_rate(8_000_000), 320);
        assert_eq!(estimate_bit_rate(8_000_001), 320);
    }

    #[test]
    fn duration_from_size_and_rate() {
        assert_eq!(estimate_duration(4_000_000, 128), 250);
        assert_eq!(estimate_duration(4_000_000, 0), 0);
        assert_eq!(estimate_duration(0, 320), 0);
    }

    #[test]
    fn file_name_with_track_number_and_artist() {
        let parsed = parse_file_name("03. Artist - Song Title.mp3");
        assert_eq!(parsed.title, "Song Title");
        assert_eq!(parsed.artist.as_deref(), Some("Artist"));
    }

    #[test]
    fn file_name_without_separator() {
        let parsed = parse_file_name("Interlude.mp3");
        assert_eq!(parsed.title, "Interlude");
        assert_eq!(parsed.artist, None);

        let numbered = parse_file_name("07 - Outro.mp3");
        assert_eq!(numbered.title, "Outro");
        assert_eq!(numbered.artist, None);
    }

    #[test]
    fn file_name_never_yields_empty_title() {
        assert_eq!(parse_file_name("01 .mp3").title, "01");
        assert_eq!(parse_file_name("Band - .mp3").title, "Band -");
        assert_eq!(parse_file_name("2Pac - Changes.mp3").artist.as_deref(), Some("2Pac"));
    }

    #[test]
    fn decoder_failure_falls_back_to_name_and_estimate() {
        let decoder = FixedDecoder(Err(()));
        let record = extract(&decoder, &[], "/dav/03. Artist - Song.mp3", "03. Artist - Song.mp3", 4_000_000);
        assert_eq!(record.scan_status, ScanStatus::Success);
        assert_eq!(record.title, "Song");
        assert_eq!(record.artist, "Artist");
        assert_eq!(record.bit_rate, 192);
        assert_eq!(record.duration, 166);
        assert_eq!(record.format, "MP3");
        assert_eq!(record.id, common::stable_id("/dav/03. Artist - Song.mp3"));
    }

    #[test]
    fn tags_win_over_file_name() {
        let decoder = FixedDecoder(Ok(TagInfo {
            title: Some("Real Title".to_string()),
            duration_secs: Some(201),
            bitrate_kbps: Some(256),
            sample_rate: Some(44_100),
            has_embedded_cover: true,
            picture_mime: Some("image/png".to_string()),
            ..TagInfo::default()
        }));
        let record = extract(&decoder, &[], "/dav/Other - Name.mp3", "Other - Name.mp3", 1_000);
        assert_eq!(record.title, "Real Title");
        assert_eq!(record.artist, "");
        assert_eq!(record.duration, 201);
        assert_eq!(record.bit_rate, 256);
        assert_eq!(record.sample_rate, 44_100);
        assert!(record.has_cover);
        assert_eq!(record.cover_mime, "image/png");
    }

    #[test]
    fn file_name_only_fills_missing_artist() {
        let decoder = FixedDecoder(Ok(TagInfo {
            artist: Some("Tagged".to_string()),
            ..TagInfo::default()
        }));
        let record = extract(&decoder, &[], "/dav/X - Y.mp3", "X - Y.mp3", 100);
        assert_eq!(record.title, "Y");
        assert_eq!(record.artist, "Tagged");
    }
}
