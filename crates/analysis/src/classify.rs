use std::collections::HashMap;

use common::{
    clamp_confidence, normalize_name, ArtistProfileRecord, LabelProfileRecord, PatternKind,
    PatternRecord,
};
use metadata::TagInfo;

use crate::filename::FilenameAnalysis;
use crate::folder::FolderAnalysis;

pub const METADATA_ARTIST_CONFIDENCE: f64 = 0.95;
pub const METADATA_GENRE_CONFIDENCE: f64 = 0.85;
pub const COMMENT_LABEL_CONFIDENCE: f64 = 0.75;
pub const FILENAME_ARTIST_CONFIDENCE: f64 = 0.70;
/// Artist profiles below this confidence are ignored as a genre source.
pub const PROFILE_CONFIDENCE_FLOOR: f64 = 0.7;
/// Profile-derived genre confidence is the histogram ratio scaled down.
pub const PROFILE_GENRE_SCALE: f64 = 0.8;
pub const REVIEW_THRESHOLD: f64 = 0.6;

#[derive(Clone, Debug, Default)]
pub struct Classification {
    pub artist: Option<String>,
    pub track_name: Option<String>,
    pub remix_info: Option<String>,
    pub label: Option<String>,
    pub primary_genre: Option<String>,
    pub secondary_genre: Option<String>,
    pub subgenre: Option<String>,
    pub artist_confidence: Option<f64>,
    pub genre_confidence: Option<f64>,
    pub label_confidence: Option<f64>,
    pub overall_confidence: f64,
    pub sources: Vec<String>,
    pub needs_review: bool,
}

/// Learned patterns keyed by (type, value) for in-memory lookup during a scan.
#[derive(Debug, Default)]
pub struct PatternIndex {
    by_key: HashMap<(PatternKind, String), Vec<PatternRecord>>,
}

impl PatternIndex {
    pub fn new(patterns: Vec<PatternRecord>) -> Self {
        let mut by_key: HashMap<(PatternKind, String), Vec<PatternRecord>> = HashMap::new();
        for pattern in patterns {
            by_key
                .entry((pattern.pattern_type, pattern.pattern_value.clone()))
                .or_default()
                .push(pattern);
        }
        Self { by_key }
    }

    pub fn best(&self, kind: PatternKind, value: &str) -> Option<&PatternRecord> {
        self.by_key
            .get(&(kind, value.to_string()))?
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Artist profiles reachable by exact name or normalized name.
#[derive(Debug, Default)]
pub struct ProfileIndex {
    by_name: HashMap<String, ArtistProfileRecord>,
}

impl ProfileIndex {
    pub fn new(profiles: Vec<ArtistProfileRecord>) -> Self {
        let mut by_name = HashMap::new();
        for profile in profiles {
            by_name.insert(profile.name.clone(), profile.clone());
            by_name.insert(profile.normalized_name.clone(), profile);
        }
        Self { by_name }
    }

    pub fn lookup(&self, artist: &str) -> Option<&ArtistProfileRecord> {
        self.by_name
            .get(artist)
            .or_else(|| self.by_name.get(&normalize_name(artist)))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TrackFacts<'a> {
    pub tags: &'a TagInfo,
    pub filename: &'a FilenameAnalysis,
    pub folder: &'a FolderAnalysis,
}

/// Merges metadata, filename and folder evidence into a best-guess
/// classification. Source precedence is fixed: tags beat filenames beat
/// learned folder patterns beat artist profiles.
pub fn classify(
    facts: TrackFacts<'_>,
    patterns: &PatternIndex,
    profiles: &ProfileIndex,
    labels: &[LabelProfileRecord],
) -> Classification {
    let mut result = Classification::default();

    if let Some(artist) = non_empty(facts.tags.artist.as_deref()) {
        result.artist = Some(artist);
        result.artist_confidence = Some(METADATA_ARTIST_CONFIDENCE);
        result.sources.push("metadata_artist".to_string());
    }

    result.track_name = non_empty(facts.tags.title.as_deref());

    if let Some(genre) = facts.tags.genres.first() {
        result.primary_genre = Some(genre.clone());
        result.secondary_genre = facts.tags.genres.get(1).cloned();
        result.genre_confidence = Some(METADATA_GENRE_CONFIDENCE);
        result.sources.push("metadata_genre".to_string());
    }

    if let Some(comment) = facts.tags.comment.as_deref() {
        let comment = comment.to_lowercase();
        for label in labels {
            if !label.normalized_name.is_empty() && comment.contains(&label.normalized_name) {
                result.label = Some(label.name.clone());
                result.label_confidence = Some(COMMENT_LABEL_CONFIDENCE);
                result.sources.push("metadata_comment".to_string());
                break;
            }
        }
    }

    if result.artist.is_none() {
        if let Some(artist) = facts.filename.artist.clone() {
            result.artist = Some(artist);
            result.artist_confidence = Some(FILENAME_ARTIST_CONFIDENCE);
            result.sources.push("filename_artist".to_string());
        }
    }

    if result.track_name.is_none() {
        result.track_name = facts.filename.title.clone();
    }

    result.remix_info = facts.filename.remix.clone();

    if result.primary_genre.is_none() {
        for hint in &facts.folder.genre_hints {
            if let Some(pattern) = patterns.best(PatternKind::Folder, hint) {
                result.primary_genre = Some(pattern.genre.clone());
                result.genre_confidence = Some(clamp_confidence(pattern.confidence));
                result.sources.push("folder_pattern".to_string());
                break;
            }
        }
    }

    if result.primary_genre.is_none() {
        if let Some(artist) = result.artist.as_deref() {
            if let Some(profile) = profiles.lookup(artist) {
                if profile.confidence_score > PROFILE_CONFIDENCE_FLOOR {
                    if let Some((genre, ratio)) = profile
                        .genre_confidence
                        .iter()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                    {
                        result.primary_genre = Some(genre.clone());
                        result.genre_confidence =
                            Some(clamp_confidence(ratio * PROFILE_GENRE_SCALE));
                        result.sources.push("artist_profile".to_string());
                    }
                }
            }
        }
    }

    let scores: Vec<f64> = [
        result.artist_confidence,
        result.genre_confidence,
        result.label_confidence,
    ]
    .into_iter()
    .flatten()
    .collect();
    result.overall_confidence = if scores.is_empty() {
        0.0
    } else {
        clamp_confidence(scores.iter().sum::<f64>() / scores.len() as f64)
    };
    result.needs_review = result.overall_confidence < REVIEW_THRESHOLD;

    result
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
