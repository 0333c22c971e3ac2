use std::collections::BTreeMap;

use common::{DuplicateGroupRecord, TrackRecord};

/// Groups stored tracks by content hash. Groups with more than one member
/// become duplicate records; the lexicographically-first path is the primary
/// so repeated scans pick a stable winner. Tracks without a database id are
/// skipped.
pub fn group_duplicates(tracks: &[TrackRecord]) -> Vec<DuplicateGroupRecord> {
    let mut by_hash: BTreeMap<&str, Vec<&TrackRecord>> = BTreeMap::new();
    for track in tracks {
        if track.id.is_none() || track.file_hash.is_empty() {
            continue;
        }
        by_hash.entry(track.file_hash.as_str()).or_default().push(track);
    }

    let mut groups = Vec::new();
    for (hash, mut members) in by_hash {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        let primary = members[0];
        let duplicate_track_ids: Vec<i64> =
            members[1..].iter().filter_map(|track| track.id).collect();
        let total_size_bytes: u64 = members.iter().map(|track| track.file_size).sum();

        groups.push(DuplicateGroupRecord {
            id: None,
            file_hash: hash.to_string(),
            primary_track_id: primary.id.unwrap_or_default(),
            duplicate_count: duplicate_track_ids.len() as u32,
            duplicate_track_ids,
            total_size_bytes,
            space_waste_bytes: total_size_bytes.saturating_sub(primary.file_size),
        });
    }
    groups
}
