use std::collections::BTreeMap;

use chrono::Utc;
use common::{clamp_confidence, normalize_name, ArtistProfileRecord};

/// Profiles need a minimum sample before they are trusted at all.
pub const MIN_PROFILE_TRACKS: usize = 10;
/// Sample-size confidence saturates here.
const CONFIDENCE_SATURATION_TRACKS: f64 = 50.0;

#[derive(Clone, Debug, Default)]
pub struct ProfileInput {
    pub genre: Option<String>,
    pub label: Option<String>,
}

/// Aggregates one artist's classified tracks into a profile. Returns `None`
/// below [`MIN_PROFILE_TRACKS`]. Confidence is the dominant genre ratio
/// scaled by sample size, saturating at 50 tracks.
pub fn build_artist_profile(name: &str, tracks: &[ProfileInput]) -> Option<ArtistProfileRecord> {
    if tracks.len() < MIN_PROFILE_TRACKS {
        return None;
    }

    let mut genre_counts: BTreeMap<String, usize> = BTreeMap::new();
    for track in tracks {
        if let Some(genre) = track.genre.as_deref() {
            let genre = genre.trim().to_lowercase();
            if !genre.is_empty() {
                *genre_counts.entry(genre).or_insert(0) += 1;
            }
        }
    }

    let total = tracks.len() as f64;
    let mut genre_confidence = BTreeMap::new();
    for (genre, count) in &genre_counts {
        genre_confidence.insert(genre.clone(), *count as f64 / total);
    }

    let mut labels: Vec<String> = Vec::new();
    for track in tracks {
        if let Some(label) = track.label.as_deref() {
            let label = label.trim();
            if !label.is_empty() && !labels.iter().any(|known| known == label) {
                labels.push(label.to_string());
            }
        }
    }
    labels.sort();

    let confidence_score = match genre_confidence.values().cloned().fold(None, max_ratio) {
        Some(max_ratio) => {
            let sample_confidence = (tracks.len() as f64 / CONFIDENCE_SATURATION_TRACKS).min(1.0);
            clamp_confidence(max_ratio * sample_confidence)
        }
        None => 0.0,
    };

    Some(ArtistProfileRecord {
        id: None,
        name: name.to_string(),
        normalized_name: normalize_name(name),
        primary_genres: genre_confidence.keys().cloned().collect(),
        genre_confidence,
        track_count: tracks.len() as u32,
        labels_worked_with: labels,
        confidence_score,
        last_updated: Some(Utc::now()),
    })
}

fn max_ratio(current: Option<f64>, next: f64) -> Option<f64> {
    match current {
        Some(value) if value >= next => Some(value),
        _ => Some(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(genres: &[&str]) -> Vec<ProfileInput> {
        genres
            .iter()
            .map(|genre| ProfileInput {
                genre: Some((*genre).to_string()),
                label: None,
            })
            .collect()
    }

    #[test]
    fn too_few_tracks_yield_no_profile() {
        assert!(build_artist_profile("Artist", &inputs(&["house"; 9])).is_none());
    }

    #[test]
    fn histogram_ratios_sum_from_counts() {
        let mut tracks = inputs(&["house"; 8]);
        tracks.extend(inputs(&["techno"; 2]));
        let profile = build_artist_profile("Artist", &tracks).unwrap();
        assert_eq!(profile.track_count, 10);
        assert!((profile.genre_confidence["house"] - 0.8).abs() < 1e-9);
        assert!((profile.genre_confidence["techno"] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn confidence_scales_with_sample_size() {
        let ten = build_artist_profile("Artist", &inputs(&["house"; 10])).unwrap();
        // 10 tracks, fully consistent: 1.0 * (10 / 50)
        assert!((ten.confidence_score - 0.2).abs() < 1e-9);

        let fifty = build_artist_profile("Artist", &inputs(&["house"; 50])).unwrap();
        assert!((fifty.confidence_score - 1.0).abs() < 1e-9);

        let hundred = build_artist_profile("Artist", &inputs(&["house"; 100])).unwrap();
        assert!(hundred.confidence_score <= 1.0);
    }

    #[test]
    fn untagged_tracks_produce_zero_confidence() {
        let tracks = vec![ProfileInput::default(); 12];
        let profile = build_artist_profile("Artist", &tracks).unwrap();
        assert_eq!(profile.confidence_score, 0.0);
        assert!(profile.genre_confidence.is_empty());
    }

    #[test]
    fn labels_are_deduplicated_and_sorted() {
        let mut tracks = inputs(&["house"; 10]);
        tracks[0].label = Some("Toolroom".to_string());
        tracks[1].label = Some("Anjunabeats".to_string());
        tracks[2].label = Some("Toolroom".to_string());
        let profile = build_artist_profile("Artist", &tracks).unwrap();
        assert_eq!(profile.labels_worked_with, vec!["Anjunabeats", "Toolroom"]);
    }
}
