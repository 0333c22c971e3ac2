use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use analysis::{
    analyze_filename, analyze_folder, blend_confidence, build_artist_profile, classify,
    group_duplicates, initial_pattern, observations, PatternIndex, PatternObservation,
    ProfileIndex, ProfileInput, TrackFacts,
};
use chrono::{DateTime, Utc};
use common::{
    is_audio_file, normalize_name, strip_nulls, ClassificationRecord, LabelProfileRecord,
    ScanSessionRecord, ScanStatus, TrackRecord, PROCESSING_VERSION,
};
use metadata::{read_tags, TagInfo};
use supabase::{
    DbError, PatternUpdate, ScanSessionUpdate, SupabaseClient, ARTIST_PROFILES_TABLE,
    DUPLICATES_TABLE, PATTERNS_TABLE, TRACKS_TABLE,
};
use tokio::task::JoinError;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ScanError {
    Io(std::io::Error),
    Db(DbError),
    Task(JoinError),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Io(err) => write!(f, "io error: {}", err),
            ScanError::Db(err) => write!(f, "database error: {}", err),
            ScanError::Task(err) => write!(f, "blocking task failed: {}", err),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err)
    }
}

impl From<DbError> for ScanError {
    fn from(err: DbError) -> Self {
        ScanError::Db(err)
    }
}

impl From<JoinError> for ScanError {
    fn from(err: JoinError) -> Self {
        ScanError::Task(err)
    }
}

#[derive(Clone, Debug)]
pub struct ScanOutcome {
    pub session_id: i64,
    pub files_discovered: u64,
    pub files_analyzed: u64,
    pub files_classified: u64,
    pub duplicates_found: u64,
    pub errors: u64,
    pub elapsed_seconds: u64,
}

/// What happened to one file. Unchanged files are skipped outright and must
/// not count as analyzed, or rescans inflate the session throughput.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileOutcome {
    Skipped,
    Analyzed { classified: bool },
}

#[derive(Debug, Default)]
struct ScanCounters {
    analyzed: u64,
    classified: u64,
    skipped: u64,
    errors: u64,
}

impl ScanCounters {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Analyzed { classified } => {
                self.analyzed += 1;
                if classified {
                    self.classified += 1;
                }
            }
        }
    }
}

/// The learned state loaded once per scan. Per-file classification then
/// works entirely in memory instead of querying the database per track.
struct Intelligence {
    patterns: PatternIndex,
    profiles: ProfileIndex,
    labels: Vec<LabelProfileRecord>,
}

impl Intelligence {
    async fn load(db: &SupabaseClient) -> Result<Self, DbError> {
        let patterns = PatternIndex::new(db.all_patterns().await?);
        let profiles = db.all_artist_profiles().await?;
        let labels = db.all_label_profiles().await?;
        info!(
            "Loaded {} patterns, {} artist profiles, {} label profiles",
            patterns.len(),
            profiles.len(),
            labels.len()
        );
        Ok(Self {
            patterns,
            profiles: ProfileIndex::new(profiles),
            labels,
        })
    }
}

pub struct Scanner {
    db: SupabaseClient,
}

impl Scanner {
    pub fn new(db: SupabaseClient) -> Self {
        Self { db }
    }

    /// Runs one full scan under a fresh session row. The session is marked
    /// completed or failed before this returns, whatever happens in between.
    pub async fn scan_directory(
        &self,
        root: &Path,
        limit: Option<usize>,
    ) -> Result<ScanOutcome, ScanError> {
        let session = ScanSessionRecord {
            id: None,
            scan_path: root.display().to_string(),
            status: ScanStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            files_discovered: 0,
            files_analyzed: 0,
            files_classified: 0,
            duplicates_found: 0,
            errors: 0,
            processing_time_seconds: 0,
            files_per_second: 0.0,
            error_message: None,
        };
        let session_id = self.db.create_scan_session(&session).await?;
        info!("Scan session {} started for {:?}", session_id, root);

        match self.run_scan(root, limit, session_id).await {
            Ok(outcome) => {
                let elapsed = outcome.elapsed_seconds.max(1);
                let update = ScanSessionUpdate {
                    status: Some(ScanStatus::Completed),
                    completed_at: Some(Utc::now()),
                    files_discovered: Some(outcome.files_discovered),
                    files_analyzed: Some(outcome.files_analyzed),
                    files_classified: Some(outcome.files_classified),
                    duplicates_found: Some(outcome.duplicates_found),
                    errors: Some(outcome.errors),
                    processing_time_seconds: Some(outcome.elapsed_seconds),
                    files_per_second: Some(outcome.files_analyzed as f64 / elapsed as f64),
                    error_message: None,
                };
                self.db.update_scan_session(session_id, &update).await?;
                Ok(outcome)
            }
            Err(err) => {
                let update = ScanSessionUpdate {
                    status: Some(ScanStatus::Failed),
                    completed_at: Some(Utc::now()),
                    error_message: Some(err.to_string()),
                    ..ScanSessionUpdate::default()
                };
                if let Err(update_err) = self.db.update_scan_session(session_id, &update).await {
                    warn!(
                        "Could not mark session {} as failed: {}",
                        session_id, update_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_scan(
        &self,
        root: &Path,
        limit: Option<usize>,
        session_id: i64,
    ) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let intelligence = Intelligence::load(&self.db).await?;

        let files = discover_audio_files(root.to_path_buf(), limit).await?;
        info!("Discovered {} audio files under {:?}", files.len(), root);

        let mut counters = ScanCounters::default();
        for (index, path) in files.iter().enumerate() {
            match self.process_file(path, session_id, &intelligence).await {
                Ok(outcome) => counters.record(outcome),
                Err(err) => {
                    counters.errors += 1;
                    warn!("Failed to process {:?}: {}", path, err);
                }
            }
            if (index + 1) % 100 == 0 {
                info!("Processed {}/{} files", index + 1, files.len());
            }
        }
        if counters.skipped > 0 {
            info!("Skipped {} unchanged files", counters.skipped);
        }

        let duplicates_found = self.detect_duplicates().await?;
        let profiles = self.rebuild_artist_profiles().await?;
        let labels = self.rebuild_label_profiles().await?;
        info!(
            "Rebuilt {} artist profiles and {} label profiles",
            profiles, labels
        );

        Ok(ScanOutcome {
            session_id,
            files_discovered: files.len() as u64,
            files_analyzed: counters.analyzed,
            files_classified: counters.classified,
            duplicates_found,
            errors: counters.errors,
            elapsed_seconds: started.elapsed().as_secs(),
        })
    }

    /// Hashes and tags one file, stores or refreshes its track row, then
    /// classifies it. Unchanged files are skipped.
    async fn process_file(
        &self,
        path: &Path,
        session_id: i64,
        intelligence: &Intelligence,
    ) -> Result<FileOutcome, ScanError> {
        let owned = path.to_path_buf();
        let (hash, size, modified, tags) =
            tokio::task::spawn_blocking(move || read_file_facts(&owned)).await??;

        let file_path = path.display().to_string();
        let existing = self.db.track_by_path(&file_path).await?;
        if let Some(current) = &existing {
            // Unchanged file already handled by this pipeline version.
            if current.file_hash == hash && current.processing_version == PROCESSING_VERSION {
                return Ok(FileOutcome::Skipped);
            }
        }

        let mut raw_metadata = BTreeMap::new();
        for (key, value) in &tags.raw {
            raw_metadata.insert(strip_nulls(key), strip_nulls(value));
        }

        let track = TrackRecord {
            id: None,
            file_path: file_path.clone(),
            file_hash: hash,
            file_size: size,
            file_modified: modified,
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
            folder_path: path
                .parent()
                .map(|parent| parent.display().to_string())
                .unwrap_or_default(),
            file_extension: path
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
                .unwrap_or_default(),
            raw_metadata,
            processing_status: "discovered".to_string(),
            processing_version: PROCESSING_VERSION.to_string(),
            scan_session_id: Some(session_id),
        };
        let track_id = match existing.and_then(|current| current.id) {
            Some(id) => {
                self.db.update_track(id, &track).await?;
                id
            }
            None => self.db.create_track(&track).await?,
        };

        let filename_analysis = analyze_filename(&track.filename);
        let folder_analysis = analyze_folder(path);
        let classification = classify(
            TrackFacts {
                tags: &tags,
                filename: &filename_analysis,
                folder: &folder_analysis,
            },
            &intelligence.patterns,
            &intelligence.profiles,
            &intelligence.labels,
        );

        let record = ClassificationRecord {
            id: None,
            track_id,
            artist: classification.artist.clone(),
            track_name: classification.track_name.clone(),
            remix_info: classification.remix_info.clone(),
            label: classification.label.clone(),
            genre: classification.primary_genre.clone(),
            secondary_genre: classification.secondary_genre.clone(),
            subgenre: classification.subgenre.clone(),
            artist_confidence: classification.artist_confidence.unwrap_or(0.0),
            genre_confidence: classification.genre_confidence.unwrap_or(0.0),
            overall_confidence: classification.overall_confidence,
            classification_source: classification
                .sources
                .first()
                .cloned()
                .unwrap_or_else(|| "none".to_string()),
            classification_sources: classification.sources.clone(),
            needs_review: classification.needs_review,
            human_validated: false,
        };
        self.db.upsert_classification(&record).await?;
        self.db.mark_track_status(track_id, "classified").await?;

        for observation in
            observations(&classification, &filename_analysis, &folder_analysis, &tags)
        {
            self.apply_observation(&observation).await?;
        }

        Ok(FileOutcome::Analyzed {
            classified: classification.primary_genre.is_some(),
        })
    }

    /// Reinforces a known pattern or records a new one. Reinforcement blends
    /// the stored confidence toward the observed one.
    async fn apply_observation(&self, observation: &PatternObservation) -> Result<(), ScanError> {
        let existing = self
            .db
            .find_pattern(observation.kind, &observation.value, &observation.genre)
            .await?;
        match existing {
            Some(pattern) => {
                let id = pattern
                    .id
                    .ok_or(ScanError::Db(DbError::MissingRow(PATTERNS_TABLE)))?;
                let update = PatternUpdate {
                    confidence: Some(blend_confidence(
                        pattern.confidence,
                        observation.confidence,
                    )),
                    sample_size: Some(pattern.sample_size + 1),
                    reinforcement_count: Some(pattern.reinforcement_count + 1),
                    last_updated: Some(Utc::now()),
                };
                self.db.update_pattern(id, &update).await?;
            }
            None => {
                let mut pattern = initial_pattern(observation);
                pattern.last_updated = Some(Utc::now());
                self.db.create_pattern(&pattern).await?;
            }
        }
        Ok(())
    }

    /// Groups the whole library by content hash and stores one duplicate
    /// record per hash with more than one file. Non-primary tracks get a
    /// duplicate status so downstream tooling can skip them.
    async fn detect_duplicates(&self) -> Result<u64, ScanError> {
        let tracks = self.db.all_tracks().await?;
        let groups = group_duplicates(&tracks);
        let mut duplicates = 0u64;
        for group in &groups {
            self.db.upsert_duplicate_group(group).await?;
            for track_id in &group.duplicate_track_ids {
                self.db.mark_track_status(*track_id, "duplicate").await?;
            }
            duplicates += u64::from(group.duplicate_count);
        }
        if duplicates > 0 {
            info!("Found {} duplicate files in {} groups", duplicates, groups.len());
        }
        Ok(duplicates)
    }

    /// Recomputes artist profiles from every stored classification. Artists
    /// below the minimum track count are left without a profile.
    async fn rebuild_artist_profiles(&self) -> Result<u64, ScanError> {
        let classifications = self.db.all_classifications().await?;
        let mut by_artist: BTreeMap<String, Vec<ProfileInput>> = BTreeMap::new();
        for classification in &classifications {
            if let Some(artist) = classification.artist.as_deref() {
                let artist = artist.trim();
                if artist.is_empty() {
                    continue;
                }
                by_artist.entry(artist.to_string()).or_default().push(ProfileInput {
                    genre: classification.genre.clone(),
                    label: classification.label.clone(),
                });
            }
        }

        let mut stored = 0u64;
        for (artist, inputs) in &by_artist {
            if let Some(profile) = build_artist_profile(artist, inputs) {
                self.db.upsert_artist_profile(&profile).await?;
                stored += 1;
            }
        }
        Ok(stored)
    }

    /// Label profiles are a flat roll-up of classified labels and the genres
    /// seen alongside them.
    async fn rebuild_label_profiles(&self) -> Result<u64, ScanError> {
        let classifications = self.db.all_classifications().await?;
        let mut by_label: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();
        for classification in &classifications {
            if let Some(label) = classification.label.as_deref() {
                let label = label.trim();
                if label.is_empty() {
                    continue;
                }
                by_label
                    .entry(label.to_string())
                    .or_default()
                    .push(classification.genre.clone());
            }
        }

        let mut stored = 0u64;
        for (label, genres) in &by_label {
            let mut primary_genres: Vec<String> = Vec::new();
            for genre in genres.iter().flatten() {
                let genre = genre.trim().to_lowercase();
                if !genre.is_empty() && !primary_genres.contains(&genre) {
                    primary_genres.push(genre);
                }
            }
            primary_genres.sort();
            let profile = LabelProfileRecord {
                id: None,
                name: label.clone(),
                normalized_name: normalize_name(label),
                primary_genres,
                release_count: genres.len() as u32,
            };
            self.db.upsert_label_profile(&profile).await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Current table counts plus the most recent session, as a JSON report.
    pub async fn status(&self) -> Result<serde_json::Value, ScanError> {
        let tracks = self.db.count_rows(TRACKS_TABLE).await?;
        let patterns = self.db.count_rows(PATTERNS_TABLE).await?;
        let artist_profiles = self.db.count_rows(ARTIST_PROFILES_TABLE).await?;
        let duplicate_groups = self.db.count_rows(DUPLICATES_TABLE).await?;
        let latest_session = self.db.latest_scan_session().await?;
        Ok(serde_json::json!({
            "processing_version": PROCESSING_VERSION,
            "tracks": tracks,
            "patterns": patterns,
            "artist_profiles": artist_profiles,
            "duplicate_groups": duplicate_groups,
            "latest_session": latest_session,
        }))
    }
}

/// Walks the tree and keeps regular files with a known audio extension, in
/// walk order. Runs on the blocking pool since it is pure filesystem work.
async fn discover_audio_files(
    root: PathBuf,
    limit: Option<usize>,
) -> Result<Vec<PathBuf>, ScanError> {
    let files = tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
                continue;
            }
            files.push(entry.into_path());
            if let Some(limit) = limit {
                if files.len() >= limit {
                    break;
                }
            }
        }
        files
    })
    .await?;
    Ok(files)
}

/// Stat, hash and tag one file. Unreadable tags are not fatal; the track
/// still gets stored and classified from its path alone.
fn read_file_facts(path: &Path) -> Result<(String, u64, DateTime<Utc>, TagInfo), ScanError> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified().map(DateTime::<Utc>::from)?;
    let hash = common::file_sha256(path)?;
    let tags = match read_tags(path) {
        Ok(tags) => tags,
        Err(err) => {
            warn!("Could not read tags from {:?}: {}", path, err);
            TagInfo::default()
        }
    };
    Ok((hash, meta.len(), modified, tags))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn discovery_filters_to_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), b"x").unwrap();
        fs::write(dir.path().join("b.FLAC"), b"x").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.wav"), b"x").unwrap();

        let files = discover_audio_files(dir.path().to_path_buf(), None)
            .await
            .unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|path| is_audio_file(path)));
    }

    #[tokio::test]
    async fn discovery_respects_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..5 {
            fs::write(dir.path().join(format!("{}.mp3", index)), b"x").unwrap();
        }
        let files = discover_audio_files(dir.path().to_path_buf(), Some(2))
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn skipped_files_do_not_count_as_analyzed() {
        let mut counters = ScanCounters::default();
        counters.record(FileOutcome::Analyzed { classified: true });
        counters.record(FileOutcome::Analyzed { classified: false });
        counters.record(FileOutcome::Skipped);
        counters.record(FileOutcome::Skipped);

        assert_eq!(counters.analyzed, 2);
        assert_eq!(counters.classified, 1);
        assert_eq!(counters.skipped, 2);
        assert_eq!(counters.errors, 0);
    }

    #[test]
    fn file_facts_survive_untaggable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        fs::write(&path, b"not actually audio").unwrap();

        let (hash, size, _, tags) = read_file_facts(&path).unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(size, 18);
        assert!(tags.artist.is_none());
    }
}
