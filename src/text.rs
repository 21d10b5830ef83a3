use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const MAX_LOOKUP_CHARS: usize = 100;
const MAX_SENTENCE_CHARS: usize = 260;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["a", "an", "the", "to", "of", "in", "on", "for", "at", "and", "or", "with"]
        .into_iter()
        .collect()
});

/// Collapse internal whitespace runs and trim. Applied to raw selections
/// before validation so ragged page text still forms a stable query.
pub fn normalize_selected_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical cache-addressing form of a query string.
pub fn normalize_lookup_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Gate for whether a raw selection becomes a lookup candidate at all.
/// Rejects empty, over-long, letterless, and punctuation/digit-only text.
pub fn is_valid_lookup_text(text: &str) -> bool {
    if text.is_empty() || text.chars().count() > MAX_LOOKUP_CHARS {
        return false;
    }
    if !text.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    !text
        .chars()
        .all(|c| c.is_ascii_digit() || c == '_' || c.is_whitespace() || !c.is_alphanumeric())
}

/// Whole-word, case-insensitive match pattern for a collection word.
pub fn to_word_pattern(word: &str) -> Option<Regex> {
    let escaped = regex::escape(word.trim());
    if escaped.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b{escaped}\b")).ok()
}

/// Heuristic "is this actually translated" detector: at least one CJK
/// ideograph or fullwidth kana/hangul codepoint.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(u32::from(c),
            0x4E00..=0x9FFF       // CJK unified ideographs
            | 0x3400..=0x4DBF     // extension A
            | 0x3040..=0x30FF     // kana
            | 0xAC00..=0xD7AF     // hangul
        )
    })
}

/// Extract the sentence enclosing `selected_text` from a block of page
/// text. Falls back to the whole (normalized) text when no sentence-like
/// segment contains the selection, and truncates the result.
pub fn extract_sentence(container_text: &str, selected_text: &str) -> Option<String> {
    let text = normalize_selected_text(container_text);
    if text.is_empty() {
        return None;
    }
    let selected = selected_text.trim().to_lowercase();
    if selected.is_empty() {
        return None;
    }
    let matched = split_sentences(&text)
        .into_iter()
        .find(|candidate| candidate.to_lowercase().contains(&selected));
    let sentence = matched.unwrap_or(text);
    Some(sentence.chars().take(MAX_SENTENCE_CHARS).collect())
}

/// Candidate keywords for the phrase-decomposition fallback: alphabetic
/// tokens longer than 2 chars, stop words dropped, deduplicated, tried
/// longest-first.
pub fn phrase_candidates(phrase: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens: Vec<String> = phrase
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '/'))
        .map(|t| t.trim().to_lowercase())
        .filter(|t| {
            t.chars().count() > 2
                && t.chars().all(|c| c.is_ascii_alphabetic())
                && !STOP_WORDS.contains(t.as_str())
        })
        .filter(|t| seen.insert(t.clone()))
        .collect();
    tokens.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    tokens
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '。' | '！' | '？') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    out
}
