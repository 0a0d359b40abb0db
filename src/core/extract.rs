//! Deterministic search-query extraction.
//!
//! Turns a free-form request ("find emails about project deadline") into
//! the filter string handed to search-style tools ("project deadline").
//! Used by basic tool planning and by personal-data routing; never calls a
//! model.

use std::sync::LazyLock;

use regex::Regex;

/// Proper nouns recognised when no phrase pattern matches.
pub const DEFAULT_KNOWN_ENTITIES: &[&str] = &["Jubilo", "Iwata", "Shizuoka", "Yamaha", "J-League"];

/// Phrase patterns, highest priority first.
static PHRASE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bcomments?\s+(?:for|on)\s+(.+)",
        r"(?i)\babout\s+(.+)",
        r"(?i)\bregarding\s+(.+)",
        r"(?i)\bfrom\s+(.+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Trailing episode markers: "ep3", "ep. 3", "episode 3", "ep #3".
static EPISODE_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)[\s,\-]*\b(?:episode|ep)\.?\s*#?\s*\d+\s*$").ok());

/// Extracts a search query from `message`.
///
/// Tries "comments for X", "about X", "regarding X", "from X" in that
/// order, then falls back to the known proper nouns found in the message
/// (OR-joined in `known_entities` order). Returns an empty string when
/// nothing matches; callers treat that as "no filter".
#[must_use]
pub fn extract_search_query<S: AsRef<str>>(message: &str, known_entities: &[S]) -> String {
    for pattern in PHRASE_PATTERNS.iter() {
        let Some(captured) = pattern.captures(message).and_then(|c| c.get(1)) else {
            continue;
        };
        let cleaned = clean_phrase(captured.as_str());
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    match_known_entities(message, known_entities).join(" OR ")
}

/// Returns the known entities mentioned in `text`, in `known_entities` order.
#[must_use]
pub fn match_known_entities<S: AsRef<str>>(text: &str, known_entities: &[S]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for entity in known_entities {
        let entity = entity.as_ref().trim();
        if entity.is_empty() || found.iter().any(|f| f.eq_ignore_ascii_case(entity)) {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(entity));
        if Regex::new(&pattern).is_ok_and(|re| re.is_match(text)) {
            found.push(entity.to_string());
        }
    }
    found
}

/// Cuts a captured phrase at sentence punctuation and strips episode
/// markers, quotes, and trailing punctuation.
fn clean_phrase(raw: &str) -> String {
    let end = raw.find(['?', '!', '\n', ';']).unwrap_or(raw.len());
    let mut phrase = raw[..end].trim().trim_end_matches(['.', ',', ':']).trim();

    if let Some(re) = EPISODE_MARKER.as_ref()
        && let Some(m) = re.find(phrase)
    {
        phrase = phrase[..m.start()].trim();
    }

    phrase
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}'))
        .trim()
        .to_string()
}
