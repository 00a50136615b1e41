//! Lexical strategies of the classification cascade.
//!
//! Two pieces: the possessive-phrase override that pins personal-achievement
//! questions to their resource without spending a model call, and the regex
//! fallback that pulls an entity name out of "who is X"-shaped questions when
//! the generative classifier came back empty-handed.

use std::sync::OnceLock;

use regex::Regex;

/// Phrases that signal a personal-achievements question. Matched fuzzily so
/// minor typos still hit.
const ACHIEVEMENT_PHRASES: [&str; 4] = [
    "my achievement",
    "my participation",
    "my logged activit",
    "my paper presentation record",
];

/// Return the matching phrase if the question fuzzily contains one of the
/// possessive achievement phrases at or above `threshold` (0-100).
pub fn achievement_phrase_match(question: &str, threshold: u8) -> Option<&'static str> {
    let normalized = question.to_lowercase();
    ACHIEVEMENT_PHRASES
        .iter()
        .find(|phrase| partial_ratio(phrase, &normalized) >= threshold)
        .copied()
}

/// Best similarity (0-100) between `needle` and any equally sized window of
/// `haystack` — a partial-ratio style score built on normalized Levenshtein.
pub fn partial_ratio(needle: &str, haystack: &str) -> u8 {
    if needle.is_empty() || haystack.is_empty() {
        return 0;
    }
    if haystack.contains(needle) {
        return 100;
    }

    let haystack_chars: Vec<char> = haystack.chars().collect();
    let needle_len = needle.chars().count();
    if haystack_chars.len() <= needle_len {
        return (strsim::normalized_levenshtein(needle, haystack) * 100.0).round() as u8;
    }

    let mut best = 0.0f64;
    for start in 0..=(haystack_chars.len() - needle_len) {
        let window: String = haystack_chars[start..start + needle_len].iter().collect();
        let score = strsim::normalized_levenshtein(needle, &window);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    (best * 100.0).round() as u8
}

/// Regex templates for entity-detail questions, tried in order.
fn entity_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^\s*who\s+is\s+(.+?)\s*\??\s*$",
            r"(?i)tell\s+me\s+about\s+(?:the\s+)?(?:event\s+)?(.+?)\s*\??\s*$",
            r"(?i)details\s+(?:of|for|about)\s+(?:student\s+|roll\s+number\s+)?(.+?)\s*\??\s*$",
            r"(?i)information\s+(?:about|on)\s+(.+?)\s*\??\s*$",
            r"(?i)^\s*what\s+is\s+(.+?)\s*\??\s*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("entity pattern must compile"))
        .collect()
    })
}

/// Extract a candidate entity name from the question, first template wins.
/// Trailing context like "from <dept>" or "in <dept>" is stripped.
pub fn entity_from_patterns(question: &str) -> Option<String> {
    for pattern in entity_patterns() {
        if let Some(captures) = pattern.captures(question) {
            let raw = captures.get(1)?.as_str();
            let name = strip_trailing_context(raw);
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

fn strip_trailing_context(name: &str) -> String {
    static CONTEXT: OnceLock<Regex> = OnceLock::new();
    let context = CONTEXT.get_or_init(|| {
        Regex::new(r"(?i)\s+(?:from|in)\s+(?:the\s+)?\S.*$").expect("context pattern must compile")
    });
    let stripped = context.replace(name, "");
    stripped
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '.')
        .to_string()
}
