/// Genre keyword table for folder and filename hints. Matching is plain
/// lowercase substring search, so broader terms ("tech") intentionally sit
/// after the genres they would shadow.
pub const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "house",
        &["house", "deep house", "tech house", "progressive house", "electro house"],
    ),
    (
        "trance",
        &["trance", "uplifting", "progressive trance", "psy trance", "vocal trance"],
    ),
    ("techno", &["techno", "minimal", "tech", "industrial"]),
    ("dubstep", &["dubstep", "brostep", "melodic dubstep"]),
    ("drum_and_bass", &["drum and bass", "dnb", "jungle", "liquid"]),
    ("breaks", &["breaks", "breakbeat", "nu breaks"]),
    ("ambient", &["ambient", "chillout", "downtempo", "lounge"]),
];

/// Each genre appears at most once regardless of how many of its keywords hit.
pub fn genre_hints(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut hints = Vec::new();
    for (genre, keywords) in GENRE_KEYWORDS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            hints.push((*genre).to_string());
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::genre_hints;

    #[test]
    fn hints_match_case_insensitively() {
        assert_eq!(genre_hints("Deep House Classics"), vec!["house"]);
        assert_eq!(genre_hints("UPLIFTING anthems"), vec!["trance"]);
    }

    #[test]
    fn multiple_keywords_for_one_genre_yield_one_hint() {
        assert_eq!(genre_hints("liquid dnb jungle"), vec!["drum_and_bass"]);
    }

    #[test]
    fn tech_prefix_hints_techno_alongside_house() {
        assert_eq!(genre_hints("tech house"), vec!["house", "techno"]);
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert!(genre_hints("holiday photos 2019").is_empty());
    }
}
