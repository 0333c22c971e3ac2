use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::keywords::genre_hints;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilenameAnalysis {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub remix: Option<String>,
    pub genre_hints: Vec<String>,
}

const ARTIST_TITLE_SEPARATORS: &[&str] = &[" - ", "_", "  "];

fn remix_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)\(([^)]*(?:remix|mix|edit|version|rework)[^)]*)\)").unwrap(),
            Regex::new(r"(?i)\[([^\]]*(?:remix|mix|edit|version|rework)[^\]]*)\]").unwrap(),
        ]
    })
}

/// Pulls artist, title, remix info and genre hints out of a bare filename.
/// The remix group is captured first and removed before the artist/title
/// split so "(Club Mix)" never leaks into the title.
pub fn analyze_filename(filename: &str) -> FilenameAnalysis {
    let mut analysis = FilenameAnalysis::default();

    let stem = Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    // Hints come from the whole stem; "(Techno Remix)" is still a hint.
    analysis.genre_hints = genre_hints(&stem);
    let mut name = stem;

    for pattern in remix_patterns() {
        if let Some(captures) = pattern.captures(&name) {
            if let Some(group) = captures.get(1) {
                analysis.remix = Some(group.as_str().trim().to_string());
            }
            name = pattern.replace(&name, "").trim().to_string();
            break;
        }
    }

    for separator in ARTIST_TITLE_SEPARATORS {
        if let Some((artist, title)) = name.split_once(separator) {
            let artist = artist.trim();
            let title = title.trim();
            if !artist.is_empty() && !title.is_empty() {
                analysis.artist = Some(artist.to_string());
                analysis.title = Some(title.to_string());
                break;
            }
        }
    }

    analysis
}
