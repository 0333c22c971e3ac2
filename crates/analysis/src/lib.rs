mod classify;
mod duplicates;
mod filename;
mod folder;
mod keywords;
mod learn;
mod profile;

pub use classify::{
    classify, Classification, PatternIndex, ProfileIndex, TrackFacts,
    COMMENT_LABEL_CONFIDENCE, FILENAME_ARTIST_CONFIDENCE, METADATA_ARTIST_CONFIDENCE,
    METADATA_GENRE_CONFIDENCE, PROFILE_CONFIDENCE_FLOOR, PROFILE_GENRE_SCALE, REVIEW_THRESHOLD,
};
pub use duplicates::group_duplicates;
pub use filename::{analyze_filename, FilenameAnalysis};
pub use folder::{analyze_folder, FolderAnalysis};
pub use keywords::{genre_hints, GENRE_KEYWORDS};
pub use learn::{
    blend_confidence, initial_pattern, observations, PatternObservation, FILENAME_LEARN_CONFIDENCE,
    FOLDER_LEARN_CONFIDENCE, LEARNING_RATE, LEARN_THRESHOLD, METADATA_LEARN_CONFIDENCE,
};
pub use profile::{build_artist_profile, ProfileInput, MIN_PROFILE_TRACKS};
