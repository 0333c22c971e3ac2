use std::path::Path;

use crate::keywords::genre_hints;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FolderAnalysis {
    pub genre_hints: Vec<String>,
    pub depth: usize,
    /// Lowercased ancestor directory names, innermost first.
    pub structure: Vec<String>,
}

pub fn analyze_folder(file_path: &Path) -> FolderAnalysis {
    let mut structure = Vec::new();
    for ancestor in file_path.ancestors().skip(1) {
        match ancestor.file_name() {
            Some(name) => structure.push(name.to_string_lossy().to_lowercase()),
            None => break,
        }
    }

    let mut hints: Vec<String> = Vec::new();
    for folder in &structure {
        for hint in genre_hints(folder) {
            if !hints.contains(&hint) {
                hints.push(hint);
            }
        }
    }

    FolderAnalysis {
        genre_hints: hints,
        depth: structure.len(),
        structure,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::analyze_folder;

    #[test]
    fn collects_hints_from_ancestor_folders() {
        let analysis = analyze_folder(Path::new("/music/Deep House/2020/track.mp3"));
        assert_eq!(analysis.genre_hints, vec!["house"]);
        assert!(analysis.structure.contains(&"deep house".to_string()));
    }

    #[test]
    fn innermost_folder_comes_first() {
        let analysis = analyze_folder(Path::new("/library/Trance/Uplifting/track.mp3"));
        assert_eq!(analysis.structure[0], "uplifting");
        assert_eq!(analysis.genre_hints, vec!["trance"]);
    }

    #[test]
    fn duplicate_hints_across_levels_collapse() {
        let analysis = analyze_folder(Path::new("/techno/minimal techno/track.mp3"));
        assert_eq!(analysis.genre_hints, vec!["techno"]);
    }

    #[test]
    fn depth_counts_named_ancestors() {
        let analysis = analyze_folder(Path::new("a/b/c/track.mp3"));
        assert_eq!(analysis.depth, 3);
    }
}
