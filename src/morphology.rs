use crate::providers::PronunciationSource;
use crate::types::Phonetic;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

const MIN_DECOMPOSED_LEN: usize = 5;
const MIN_CORE_LEN: usize = 3;

/// Fixed affix tables for pedagogical decomposition. Longest match wins;
/// ordering within the table is not significant.
const PREFIXES: &[&str] = &[
    "anti", "auto", "bi", "co", "counter", "de", "dis", "en", "ex", "extra", "fore", "hyper",
    "il", "im", "in", "inter", "ir", "micro", "mid", "mis", "mono", "multi", "non", "over",
    "post", "pre", "pro", "re", "semi", "sub", "super", "trans", "tri", "ultra", "un", "under",
];

const SUFFIXES: &[&str] = &[
    "able", "age", "al", "ance", "ation", "dom", "ed", "ence", "er", "est", "ful", "hood",
    "ible", "ic", "ical", "ify", "ing", "ion", "ish", "ism", "ist", "ity", "ive", "ize",
    "less", "ly", "ment", "ness", "or", "ous", "ship", "sion", "tion", "ward", "y",
];

/// Decompose a word into `[prefix?, core, suffix?]` tokens. Short or
/// unmatchable words come back as a single cleaned token.
pub fn derive_morphology(word: &str) -> Vec<String> {
    let cleaned: String = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        return Vec::new();
    }
    if cleaned.len() < MIN_DECOMPOSED_LEN {
        return vec![cleaned];
    }

    let mut core = cleaned.as_str();
    let prefix = longest_prefix(core);
    if let Some(p) = prefix {
        core = &core[p.len()..];
    }
    let suffix = longest_suffix(core);
    if let Some(s) = suffix {
        core = &core[..core.len() - s.len()];
    }

    if prefix.is_none() && suffix.is_none() {
        return vec![cleaned];
    }
    let mut tokens = Vec::with_capacity(3);
    if let Some(p) = prefix {
        tokens.push(p.to_string());
    }
    tokens.push(core.to_string());
    if let Some(s) = suffix {
        tokens.push(s.to_string());
    }
    tokens
}

fn longest_prefix(word: &str) -> Option<&'static str> {
    PREFIXES
        .iter()
        .filter(|p| word.starts_with(**p) && word.len() - p.len() >= MIN_CORE_LEN)
        .max_by_key(|p| p.len())
        .copied()
}

fn longest_suffix(word: &str) -> Option<&'static str> {
    SUFFIXES
        .iter()
        .filter(|s| word.ends_with(**s) && word.len() - s.len() >= MIN_CORE_LEN)
        .max_by_key(|s| s.len())
        .copied()
}

// A token queried once is never re-queried for the process lifetime, even
// when the provider had nothing for it.
static PRONOUNCE_MEMO: Lazy<RwLock<HashMap<String, Option<String>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Resolve a transcription per morphology token through the
/// pronunciation-by-spelling provider, reusing the single result for both
/// accents. Returns nothing when no token resolved.
pub async fn build_morphology_phonetics(
    tokens: &[String],
    source: &dyn PronunciationSource,
) -> Option<BTreeMap<String, Phonetic>> {
    let mut map = BTreeMap::new();
    for token in tokens {
        if let Some(raw) = pronounce_memoized(token, source).await {
            map.insert(token.clone(), Phonetic::both(Some(raw)));
        }
    }
    if map.is_empty() { None } else { Some(map) }
}

pub async fn pronounce_memoized(
    token: &str,
    source: &dyn PronunciationSource,
) -> Option<String> {
    if let Some(cached) = PRONOUNCE_MEMO.read().get(token) {
        return cached.clone();
    }
    let resolved = source.pronounce(token).await;
    PRONOUNCE_MEMO
        .write()
        .insert(token.to_string(), resolved.clone());
    resolved
}

const ARPABET_TO_IPA: &[(&str, &str)] = &[
    ("AA", "ɑː"), ("AE", "æ"), ("AH", "ʌ"), ("AO", "ɔː"), ("AW", "aʊ"), ("AY", "aɪ"),
    ("B", "b"), ("CH", "tʃ"), ("D", "d"), ("DH", "ð"), ("EH", "e"), ("ER", "ɝ"),
    ("EY", "eɪ"), ("F", "f"), ("G", "ɡ"), ("HH", "h"), ("IH", "ɪ"), ("IY", "iː"),
    ("JH", "dʒ"), ("K", "k"), ("L", "l"), ("M", "m"), ("N", "n"), ("NG", "ŋ"),
    ("OW", "oʊ"), ("OY", "ɔɪ"), ("P", "p"), ("R", "r"), ("S", "s"), ("SH", "ʃ"),
    ("T", "t"), ("TH", "θ"), ("UH", "ʊ"), ("UW", "uː"), ("V", "v"), ("W", "w"),
    ("Y", "j"), ("Z", "z"), ("ZH", "ʒ"),
];

const ARPABET_VOWELS: &[&str] = &[
    "AA", "AE", "AH", "AO", "AW", "AY", "EH", "ER", "EY", "IH", "IY", "OW", "OY", "UH", "UW",
];

/// Display normalization: IPA passes through, ARPABET converts with
/// primary/secondary stress marks attached to the following vowel.
pub fn format_phonetic(raw: Option<&str>) -> String {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return "-".to_string();
    };
    if text.chars().any(|c| "/ɪʊəæɑɔʃʒθðŋ".contains(c)) {
        return text.to_string();
    }
    if !text
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace())
    {
        return text.to_string();
    }

    let mut pending_stress = "";
    let mut out = String::new();
    for token in text.split_whitespace() {
        let base: String = token.chars().take_while(|c| c.is_ascii_uppercase()).collect();
        let stress: Option<char> = token.chars().find(|c| c.is_ascii_digit());
        match stress {
            Some('1') => pending_stress = "ˈ",
            Some('2') => pending_stress = "ˌ",
            _ => {}
        }
        let ipa = ARPABET_TO_IPA
            .iter()
            .find(|(arp, _)| *arp == base)
            .map(|(_, ipa)| (*ipa).to_string())
            .unwrap_or_else(|| base.to_lowercase());
        if ARPABET_VOWELS.contains(&base.as_str()) && !pending_stress.is_empty() {
            out.push_str(pending_stress);
            pending_stress = "";
        }
        out.push_str(&ipa);
    }
    out
}

const POS_ZH: &[(&str, &str)] = &[
    ("noun", "名词"), ("n", "名词"),
    ("verb", "动词"), ("v", "动词"),
    ("adjective", "形容词"), ("adj", "形容词"),
    ("adverb", "副词"), ("adv", "副词"),
    ("pronoun", "代词"), ("pron", "代词"),
    ("preposition", "介词"), ("prep", "介词"),
    ("conjunction", "连词"), ("conj", "连词"),
    ("interjection", "感叹词"), ("int", "感叹词"),
    ("determiner", "限定词"),
    ("article", "冠词"),
    ("phrase", "短语"),
    ("idiom", "习语"),
    ("unknown", "未知词性"),
];

/// Display label for a part of speech: known tags get a Chinese name
/// with the raw tag in parentheses, unknown tags pass through.
pub fn format_part_of_speech(pos: &str) -> String {
    let raw = pos.trim().trim_end_matches('.');
    let raw = if raw.is_empty() { "unknown" } else { raw };
    let key = raw.to_lowercase();
    match POS_ZH.iter().find(|(tag, _)| *tag == key) {
        Some((_, zh)) => format!("{zh} ({raw})"),
        None => raw.to_string(),
    }
}
