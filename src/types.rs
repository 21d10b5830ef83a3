use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub const LOOKUP_CACHE_MAX: usize = 1500;
pub const REVIEW_QUEUE_MAX: usize = 500;

/// One sense of a looked-up word. `translation` and `example_translation`
/// are filled in by the translation enricher after the provider response
/// is mapped; both stay absent when every provider declines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionItem {
    pub part_of_speech: String,
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl DefinitionItem {
    pub fn new(part_of_speech: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            part_of_speech: part_of_speech.into(),
            definition: definition.into(),
            example: None,
            example_translation: None,
            translation: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phonetic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us: Option<String>,
}

impl Phonetic {
    pub fn both(value: Option<String>) -> Self {
        Self {
            uk: value.clone(),
            us: value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uk.is_none() && self.us.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us: Option<String>,
}

/// The unit of lookup result. `word` keeps provider casing for display;
/// the collection store always keys by the lowercase form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordRecord {
    pub word: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_zh: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_sentence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_sentence_zh: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_explanation_zh: Option<String>,
    #[serde(default)]
    pub phonetic: Phonetic,
    #[serde(default)]
    pub audio: AudioLinks,
    pub definitions: Vec<DefinitionItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morphology: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morphology_phonetics: Option<BTreeMap<String, Phonetic>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<u64>,
}

impl WordRecord {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            translation_zh: None,
            context_sentence: None,
            context_sentence_zh: None,
            context_explanation_zh: None,
            phonetic: Phonetic::default(),
            audio: AudioLinks::default(),
            definitions: Vec::new(),
            morphology: None,
            morphology_phonetics: None,
            collected_at: None,
        }
    }

    /// Context fields are request-specific, not word-specific. Cached
    /// records never carry them; they are recomputed per lookup.
    pub fn strip_context(&mut self) {
        self.context_sentence = None;
        self.context_sentence_zh = None;
        self.context_explanation_zh = None;
    }

    pub fn has_context(&self) -> bool {
        self.context_sentence.is_some()
            || self.context_sentence_zh.is_some()
            || self.context_explanation_zh.is_some()
    }
}

/// Cache wrapper stored under the normalized query key. `seq` breaks
/// `cached_at` ties when several writes land in the same millisecond.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupCacheEntry {
    pub data: WordRecord,
    pub cached_at: u64,
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueItem {
    pub word: String,
    pub added_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSyncEntry {
    pub word: String,
    pub data: WordRecord,
    pub collected_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSyncPayload {
    pub words: Vec<CollectionSyncEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    #[default]
    Uk,
    Us,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub morphology_accent: Accent,
}

/// Collapse arbitrary stored JSON into a valid settings object. Anything
/// that is not an object with a recognized accent yields the default.
pub fn normalize_settings(input: Option<&serde_json::Value>) -> Settings {
    let Some(value) = input else {
        return Settings::default();
    };
    let accent = value
        .get("morphologyAccent")
        .and_then(|v| v.as_str())
        .map(|v| if v == "us" { Accent::Us } else { Accent::Uk })
        .unwrap_or_default();
    Settings {
        morphology_accent: accent,
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_default_for_invalid_input() {
        assert_eq!(normalize_settings(None), Settings::default());
        assert_eq!(normalize_settings(Some(&json!("x"))), Settings::default());
        assert_eq!(normalize_settings(Some(&json!(null))), Settings::default());
    }

    #[test]
    fn settings_accept_us_accent() {
        let value = json!({ "morphologyAccent": "us" });
        assert_eq!(
            normalize_settings(Some(&value)),
            Settings {
                morphology_accent: Accent::Us
            }
        );
    }

    #[test]
    fn settings_collapse_unknown_accent_to_default() {
        let value = json!({ "morphologyAccent": "au" });
        assert_eq!(normalize_settings(Some(&value)), Settings::default());
    }

    #[test]
    fn strip_context_is_idempotent() {
        let mut record = WordRecord::new("apple");
        record.definitions.push(DefinitionItem::new("noun", "a fruit"));
        let before = record.clone();
        record.strip_context();
        assert_eq!(record, before);
        assert!(!record.has_context());
    }

    #[test]
    fn record_round_trips_with_camel_case_keys() {
        let mut record = WordRecord::new("Apple");
        record.translation_zh = Some("苹果".to_string());
        record.definitions.push(DefinitionItem::new("noun", "a fruit"));
        record.collected_at = Some(42);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["translationZh"], "苹果");
        assert_eq!(value["collectedAt"], 42);
        assert_eq!(value["definitions"][0]["partOfSpeech"], "noun");
        let back: WordRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
