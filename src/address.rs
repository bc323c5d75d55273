//! Street-address normalization for matching property records across
//! sources: uppercase, strip punctuation, abbreviate suffixes and
//! directionals, collapse whitespace.

use regex::Regex;
use std::sync::OnceLock;

/// Full word → postal abbreviation, applied on word boundaries.
const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("DRIVE", "DR"),
    ("ROAD", "RD"),
    ("BOULEVARD", "BLVD"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("CIRCLE", "CIR"),
    ("TRAIL", "TRL"),
    ("PARKWAY", "PKWY"),
    ("PLACE", "PL"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
];

fn abbreviation_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        STREET_ABBREVIATIONS
            .iter()
            .map(|(word, abbreviation)| {
                (Regex::new(&format!(r"\b{word}\b")).unwrap(), *abbreviation)
            })
            .collect()
    })
}

/// Normalize an address for matching. Empty input yields `None`.
pub fn normalize_address(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let upper = raw.to_uppercase();
    let stripped: String = upper
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();
    let mut abbreviated = stripped;
    for (pattern, abbreviation) in abbreviation_patterns() {
        abbreviated = pattern.replace_all(&abbreviated, *abbreviation).into_owned();
    }
    Some(
        abbreviated
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    )
}
