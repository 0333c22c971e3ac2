use std::collections::BTreeMap;
use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::tag::ItemValue;

#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub comment: Option<String>,
    pub year: Option<i32>,
    pub bpm: Option<u16>,
    pub track_no: Option<u16>,
    pub duration_ms: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bitrate: Option<u32>,
    pub genres: Vec<String>,
    /// Every textual tag item, keyed by its item-key name. Persisted verbatim
    /// as the track's raw tag dictionary.
    pub raw: BTreeMap<String, String>,
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

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration_ms = properties.duration().as_millis();
    if duration_ms > 0 {
        let clamped = duration_ms.min(u128::from(u32::MAX)) as u32;
        info.duration_ms = Some(clamped);
    }

    info.sample_rate = properties.sample_rate();
    info.channels = properties.channels();
    info.bitrate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        let album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|v| v.to_string());
        let track_artist = tag.get_string(&ItemKey::TrackArtist).map(|v| v.to_string());
        info.artist = track_artist.or_else(|| album_artist.clone());
        info.album_artist = album_artist;
        info.comment = tag.get_string(&ItemKey::Comment).map(|v| v.to_string());
        info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_u16);
        info.year = tag.get_string(&ItemKey::Year).and_then(parse_year);
        info.bpm = tag.get_string(&ItemKey::IntegerBpm).and_then(parse_bpm);
        if let Some(value) = tag.get_string(&ItemKey::Genre) {
            info.genres = parse_genres(value);
        }

        for item in tag.items() {
            if let ItemValue::Text(text) = item.value() {
                info.raw.insert(format!("{:?}", item.key()), text.clone());
            }
        }
    }

    Ok(info)
}

fn parse_u16(text: &str) -> Option<u16> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

/// First run of four digits wins; tag date fields show up as "2003",
/// "2003-06-01", or worse.
fn parse_year(text: &str) -> Option<i32> {
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
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

fn parse_bpm(text: &str) -> Option<u16> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<u16>() {
        return Some(value);
    }
    // Some taggers write fractional BPM.
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| *value > 0.0 && *value <= f64::from(u16::MAX))
        .map(|value| value.round() as u16)
}

fn parse_genres(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', ',', '/', '|', '\0'][..]) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(trimmed.to_string());
    }
    if out.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u16_takes_leading_part_of_slashed_numbers() {
        assert_eq!(parse_u16("3/12"), Some(3));
        assert_eq!(parse_u16(" 7 "), Some(7));
        assert_eq!(parse_u16("not a number"), None);
    }

    #[test]
    fn parse_year_finds_four_digit_run() {
        assert_eq!(parse_year("2003-06-01"), Some(2003));
        assert_eq!(parse_year("released 1997"), Some(1997));
        assert_eq!(parse_year("97"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn parse_bpm_accepts_integers_and_fractions() {
        assert_eq!(parse_bpm("128"), Some(128));
        assert_eq!(parse_bpm("174.02"), Some(174));
        assert_eq!(parse_bpm("fast"), None);
        assert_eq!(parse_bpm("-3"), None);
    }

    #[test]
    fn parse_genres_splits_on_common_separators() {
        assert_eq!(
            parse_genres("House; Techno / Ambient"),
            vec!["House", "Techno", "Ambient"]
        );
        assert_eq!(parse_genres("Drum & Bass"), vec!["Drum & Bass"]);
        assert!(parse_genres("  ").is_empty());
    }
}
