use common::{clamp_confidence, PatternKind, PatternRecord};
use metadata::TagInfo;

use crate::classify::Classification;
use crate::filename::FilenameAnalysis;
use crate::folder::FolderAnalysis;

/// Canonical reinforcement: a linear blend toward the observed confidence.
/// Repeated reinforcement converges monotonically toward the observation.
pub const LEARNING_RATE: f64 = 0.1;
/// Only classifications above this overall confidence feed the pattern store.
pub const LEARN_THRESHOLD: f64 = 0.7;

pub const FILENAME_LEARN_CONFIDENCE: f64 = 0.8;
pub const FOLDER_LEARN_CONFIDENCE: f64 = 0.9;
pub const METADATA_LEARN_CONFIDENCE: f64 = 0.85;

#[derive(Clone, Debug, PartialEq)]
pub struct PatternObservation {
    pub kind: PatternKind,
    pub value: String,
    pub genre: String,
    pub confidence: f64,
}

pub fn blend_confidence(old: f64, observed: f64) -> f64 {
    clamp_confidence(old * (1.0 - LEARNING_RATE) + observed * LEARNING_RATE)
}

/// The stored form of a first-time observation. Both confidence and success
/// rate start at the observed confidence; reinforcement moves them apart.
pub fn initial_pattern(observation: &PatternObservation) -> PatternRecord {
    PatternRecord {
        id: None,
        pattern_type: observation.kind,
        pattern_value: observation.value.clone(),
        genre: observation.genre.clone(),
        confidence: observation.confidence,
        sample_size: 1,
        reinforcement_count: 0,
        success_rate: observation.confidence,
        last_updated: None,
    }
}

/// Observations to record for a finished classification. Empty unless the
/// track got a primary genre with overall confidence above [`LEARN_THRESHOLD`].
pub fn observations(
    classification: &Classification,
    filename: &FilenameAnalysis,
    folder: &FolderAnalysis,
    tags: &TagInfo,
) -> Vec<PatternObservation> {
    let genre = match classification.primary_genre.as_deref() {
        Some(genre) if classification.overall_confidence > LEARN_THRESHOLD => genre,
        _ => return Vec::new(),
    };

    let mut out = Vec::new();
    for hint in &filename.genre_hints {
        out.push(PatternObservation {
            kind: PatternKind::Filename,
            value: hint.clone(),
            genre: genre.to_string(),
            confidence: FILENAME_LEARN_CONFIDENCE,
        });
    }
    for hint in &folder.genre_hints {
        out.push(PatternObservation {
            kind: PatternKind::Folder,
            value: hint.clone(),
            genre: genre.to_string(),
            confidence: FOLDER_LEARN_CONFIDENCE,
        });
    }
    if let Some(tag_genre) = tags.genres.first() {
        out.push(PatternObservation {
            kind: PatternKind::Metadata,
            value: tag_genre.clone(),
            genre: genre.to_string(),
            confidence: METADATA_LEARN_CONFIDENCE,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::filename::analyze_filename;
    use crate::folder::analyze_folder;

    #[test]
    fn blend_moves_a_tenth_of_the_way() {
        let blended = blend_confidence(0.5, 1.0);
        assert!((blended - 0.55).abs() < 1e-9);
    }

    #[test]
    fn blend_stays_within_bounds() {
        assert!(blend_confidence(1.0, 2.0) <= 1.0);
        assert!(blend_confidence(0.0, -1.0) >= 0.0);
    }

    #[test]
    fn repeated_reinforcement_converges_toward_observation() {
        let mut confidence = 0.2;
        let mut previous_gap = (0.9f64 - confidence).abs();
        for _ in 0..50 {
            confidence = blend_confidence(confidence, 0.9);
            let gap = (0.9f64 - confidence).abs();
            assert!(gap < previous_gap);
            previous_gap = gap;
        }
        assert!((0.9 - confidence).abs() < 0.01);
    }

    #[test]
    fn first_observation_seeds_success_rate_from_confidence() {
        let observation = PatternObservation {
            kind: PatternKind::Folder,
            value: "house".to_string(),
            genre: "house".to_string(),
            confidence: FOLDER_LEARN_CONFIDENCE,
        };
        let pattern = initial_pattern(&observation);
        assert_eq!(pattern.pattern_type, PatternKind::Folder);
        assert_eq!(pattern.success_rate, FOLDER_LEARN_CONFIDENCE);
        assert_eq!(pattern.confidence, FOLDER_LEARN_CONFIDENCE);
        assert_eq!(pattern.sample_size, 1);
        assert_eq!(pattern.reinforcement_count, 0);
    }

    #[test]
    fn low_confidence_classification_learns_nothing() {
        let classification = Classification {
            primary_genre: Some("house".to_string()),
            overall_confidence: 0.5,
            ..Classification::default()
        };
        let filename = analyze_filename("deep house anthem.mp3");
        let folder = analyze_folder(Path::new("/music/house/x.mp3"));
        let tags = TagInfo::default();
        assert!(observations(&classification, &filename, &folder, &tags).is_empty());
    }

    #[test]
    fn confident_classification_emits_per_source_observations() {
        let classification = Classification {
            primary_genre: Some("house".to_string()),
            overall_confidence: 0.9,
            ..Classification::default()
        };
        let filename = analyze_filename("artist - deep house anthem.mp3");
        let folder = analyze_folder(Path::new("/music/house/x.mp3"));
        let tags = TagInfo {
            genres: vec!["House".to_string()],
            ..TagInfo::default()
        };

        let observed = observations(&classification, &filename, &folder, &tags);
        assert_eq!(observed.len(), 3);
        assert!(observed.iter().any(|obs| obs.kind == PatternKind::Filename
            && (obs.confidence - FILENAME_LEARN_CONFIDENCE).abs() < 1e-9));
        assert!(observed.iter().any(|obs| obs.kind == PatternKind::Folder
            && (obs.confidence - FOLDER_LEARN_CONFIDENCE).abs() < 1e-9));
        assert!(observed.iter().any(|obs| obs.kind == PatternKind::Metadata
            && obs.value == "House"));
    }
}
