use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Bumping this forces every track through the pipeline again on the next scan.
pub const PROCESSING_VERSION: &str = "v1.8";

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "aac", "ogg", "wma"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub file_path: String,
    pub file_hash: String,
    pub file_size: u64,
    pub file_modified: DateTime<Utc>,
    pub filename: String,
    pub folder_path: String,
    pub file_extension: String,
    #[serde(default)]
    pub raw_metadata: BTreeMap<String, String>,
    pub processing_status: String,
    pub processing_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_session_id: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClassificationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub track_id: i64,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub remix_info: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub secondary_genre: Option<String>,
    #[serde(default)]
    pub subgenre: Option<String>,
    #[serde(default)]
    pub artist_confidence: f64,
    #[serde(default)]
    pub genre_confidence: f64,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default)]
    pub classification_source: String,
    #[serde(default)]
    pub classification_sources: Vec<String>,
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default)]
    pub human_validated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Filename,
    Folder,
    Metadata,
}

impl PatternKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Filename => "filename",
            PatternKind::Folder => "folder",
            PatternKind::Metadata => "metadata",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub pattern_type: PatternKind,
    pub pattern_value: String,
    pub genre: String,
    pub confidence: f64,
    pub sample_size: u32,
    #[serde(default)]
    pub reinforcement_count: u32,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtistProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub normalized_name: String,
    #[serde(default)]
    pub primary_genres: Vec<String>,
    #[serde(default)]
    pub genre_confidence: BTreeMap<String, f64>,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub labels_worked_with: Vec<String>,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LabelProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub normalized_name: String,
    #[serde(default)]
    pub primary_genres: Vec<String>,
    #[serde(default)]
    pub release_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DuplicateGroupRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub file_hash: String,
    pub primary_track_id: i64,
    pub duplicate_track_ids: Vec<i64>,
    pub duplicate_count: u32,
    pub total_size_bytes: u64,
    pub space_waste_bytes: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanSessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub scan_path: String,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files_discovered: u64,
    #[serde(default)]
    pub files_analyzed: u64,
    #[serde(default)]
    pub files_classified: u64,
    #[serde(default)]
    pub duplicates_found: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub processing_time_seconds: u64,
    #[serde(default)]
    pub files_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Confidence scores live in [0, 1] on every write path. NaN collapses to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('&', "and").replace(' ', "")
}

/// Postgres rejects NUL bytes in text columns.
pub fn strip_nulls(value: &str) -> String {
    if value.contains('\0') {
        value.replace('\0', "")
    } else {
        value.to_string()
    }
}

pub fn sanitize_json(value: &mut Value) {
    match value {
        Value::String(text) => {
            if text.contains('\0') {
                *text = text.replace('\0', "");
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_json(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_json(item);
            }
        }
        _ => {}
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            AUDIO_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use super::*;

    #[test]
    fn clamp_confidence_bounds() {
        assert_eq!(clamp_confidence(1.4), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(0.85), 0.85);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn normalize_name_collapses_spacing_and_ampersand() {
        assert_eq!(normalize_name("Above & Beyond"), "aboveandbeyond");
        assert_eq!(normalize_name("  Deadmau5 "), "deadmau5");
    }

    #[test]
    fn strip_nulls_removes_embedded_nul() {
        assert_eq!(strip_nulls("Dee\0p House"), "Deep House");
        assert_eq!(strip_nulls("clean"), "clean");
    }

    #[test]
    fn sanitize_json_walks_nested_values() {
        let mut value = serde_json::json!({
            "artist": "A\0rtist",
            "tags": ["hou\0se", "clean"],
            "nested": { "comment": "\0" },
            "count": 3,
        });
        sanitize_json(&mut value);
        assert_eq!(value["artist"], "Artist");
        assert_eq!(value["tags"][0], "house");
        assert_eq!(value["nested"]["comment"], "");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn audio_extension_check_is_case_insensitive() {
        assert!(is_audio_file(Path::new("track.MP3")));
        assert!(is_audio_file(Path::new("dir/track.flac")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("noext")));
    }

    #[test]
    fn file_sha256_is_deterministic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"same bytes").unwrap();
        let first = file_sha256(file.path()).unwrap();
        let second = file_sha256(file.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}
