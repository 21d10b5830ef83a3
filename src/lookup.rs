use crate::cache::LookupCache;
use crate::error::Result;
use crate::morphology::{build_morphology_phonetics, derive_morphology};
use crate::providers::{
    DatamusePronouncer, DictEntry, DictionarySource, FreeDictionaryApi, PrimarySource,
    PronunciationSource,
};
use crate::text::{contains_cjk, normalize_lookup_key, phrase_candidates};
use crate::translate::Translator;
use crate::types::{DefinitionItem, Phonetic, WordRecord};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_DEFINITIONS_PER_MEANING: usize = 2;
const SENTENCE_CACHE_CAP: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// The central lookup state machine:
/// cache check → primary backend → direct public dictionary → phrase
/// decomposition → terminal synthetic record. Every branch settles into a
/// structurally valid record; provider trouble is a fallback outcome, not
/// an error.
pub struct LookupPipeline {
    cache: LookupCache,
    primary: Option<Box<dyn PrimarySource>>,
    dictionary: Box<dyn DictionarySource>,
    pronouncer: Box<dyn PronunciationSource>,
    translator: Translator,
    // Per-session context sentence translations, keyed by exact text, so
    // repeated lookups on the same page do not re-translate the sentence.
    sentence_cache: Mutex<LruCache<String, String>>,
}

impl LookupPipeline {
    pub fn new(cache: LookupCache, primary: Option<Box<dyn PrimarySource>>) -> Self {
        Self::with_sources(
            cache,
            primary,
            Box::new(FreeDictionaryApi::from_env()),
            Box::new(DatamusePronouncer),
            Translator::default(),
        )
    }

    pub fn with_sources(
        cache: LookupCache,
        primary: Option<Box<dyn PrimarySource>>,
        dictionary: Box<dyn DictionarySource>,
        pronouncer: Box<dyn PronunciationSource>,
        translator: Translator,
    ) -> Self {
        Self {
            cache,
            primary,
            dictionary,
            pronouncer,
            translator,
            sentence_cache: Mutex::new(LruCache::new(SENTENCE_CACHE_CAP)),
        }
    }

    /// Resolve a query into an enriched record, optionally carrying an
    /// in-context explanation built from the surrounding sentence.
    pub async fn lookup(&self, text: &str, context_sentence: Option<&str>) -> WordRecord {
        let key = normalize_lookup_key(text);
        if key.is_empty() {
            let mut record = not_found_record(text);
            self.enrich(&mut record).await;
            return record;
        }

        if let Some(mut record) = self.cache.get(&key) {
            debug!(key = %key, "lookup cache hit");
            self.enrich(&mut record).await;
            self.apply_context_info(&mut record, context_sentence).await;
            return record;
        }

        let mut record = self.resolve_remote(&key).await;
        self.enrich(&mut record).await;
        if let Err(err) = self.cache.set(&key, &record).await {
            warn!(error = %err, key = %key, "failed to cache lookup result");
        }
        self.apply_context_info(&mut record, context_sentence).await;
        record
    }

    async fn resolve_remote(&self, key: &str) -> WordRecord {
        if let Some(primary) = &self.primary {
            if let Some(record) = primary.lookup(key).await {
                info!(key = %key, "resolved via primary backend");
                return record;
            }
        }

        match self.dictionary.entries(key).await {
            Ok(Some(entries)) => {
                info!(key = %key, "resolved via public dictionary");
                return self.map_entry(key, &entries[0]).await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, key = %key, "dictionary provider failed");
                return unavailable_record(key);
            }
        }

        if key.contains(char::is_whitespace) {
            match self.resolve_phrase(key).await {
                Ok(Some(record)) => return record,
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, phrase = %key, "dictionary provider failed");
                    return unavailable_record(key);
                }
            }
        }

        info!(key = %key, "lookup exhausted all strategies");
        not_found_record(key)
    }

    /// Phrase decomposition fallback: try candidate keywords longest-first
    /// and present the first hit's senses behind an explanatory lead
    /// definition. The whole-phrase translation is attempted separately by
    /// the enrichment pass (the record's word stays the phrase).
    async fn resolve_phrase(&self, phrase: &str) -> Result<Option<WordRecord>> {
        for candidate in phrase_candidates(phrase) {
            let Some(entries) = self.dictionary.entries(&candidate).await? else {
                continue;
            };
            info!(phrase = %phrase, keyword = %candidate, "phrase resolved via keyword");
            let base = self.map_entry(&candidate, &entries[0]).await;
            let mut lead = DefinitionItem::new(
                "phrase",
                format!("短语“{phrase}”未直接命中，以下为关键词 “{candidate}” 的释义。"),
            );
            lead.example = Some(format!("Core-word fallback: {candidate}"));
            lead.translation = Some(format!("短语改为关键词 {candidate} 的解释结果。"));

            let mut record = base;
            record.word = phrase.to_string();
            record.morphology = None;
            record.morphology_phonetics = None;
            record.definitions.insert(0, lead);
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// Map a raw provider entry into a record: at most two definitions per
    /// part-of-speech group, phonetic/audio selected by UK/US hints, and a
    /// spelled-pronunciation fallback when the entry has no phonetics.
    async fn map_entry(&self, word: &str, entry: &DictEntry) -> WordRecord {
        let canonical = entry
            .word
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .unwrap_or(word);
        let mut record = WordRecord::new(canonical);

        record.phonetic = choose_phonetic(&entry.phonetics, entry.phonetic.as_deref());
        record.audio.uk = choose_audio(&entry.phonetics, "uk");
        record.audio.us = choose_audio(&entry.phonetics, "us");

        for meaning in &entry.meanings {
            let part_of_speech = meaning
                .part_of_speech
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or("unknown");
            for def in meaning.definitions.iter().take(MAX_DEFINITIONS_PER_MEANING) {
                let Some(text) = def.definition.as_deref().filter(|d| !d.is_empty()) else {
                    continue;
                };
                let mut item = DefinitionItem::new(part_of_speech, text);
                item.example = def.example.clone().filter(|e| !e.is_empty());
                record.definitions.push(item);
            }
        }
        if record.definitions.is_empty() {
            let mut item =
                DefinitionItem::new("unknown", format!("{canonical} 的释义暂缺"));
            item.example = Some(format!("No example available for {canonical}."));
            record.definitions.push(item);
        }

        if record.phonetic.is_empty() {
            record.phonetic = Phonetic::both(self.pronouncer.pronounce(canonical).await);
        }
        record
    }

    /// Fixed enrichment sequence applied to cache hits and fresh records
    /// alike: morphology, morphology phonetics, then translation. Each
    /// step is idempotent, so partially-enriched cached records complete
    /// incrementally.
    async fn enrich(&self, record: &mut WordRecord) {
        let is_single_word = !record.word.contains(char::is_whitespace);
        if record.morphology.is_none() && is_single_word {
            let tokens = derive_morphology(&record.word);
            if !tokens.is_empty() {
                record.morphology = Some(tokens);
            }
        }
        if record.morphology_phonetics.is_none() {
            if let Some(tokens) = record.morphology.clone() {
                record.morphology_phonetics =
                    build_morphology_phonetics(&tokens, self.pronouncer.as_ref()).await;
            }
        }
        self.translator.ensure_translation(record).await;
        if record.definitions.is_empty() {
            record
                .definitions
                .push(DefinitionItem::new("unknown", format!("{} 的释义暂缺", record.word)));
        }
    }

    /// Attach or strip per-request context. Without a sentence this is an
    /// idempotent strip; with one, the sentence is translated (through the
    /// session cache) and a one-line explanation is synthesized from the
    /// resolved meaning.
    pub async fn apply_context_info(&self, record: &mut WordRecord, sentence: Option<&str>) {
        let Some(sentence) = sentence.map(str::trim).filter(|s| !s.is_empty()) else {
            record.strip_context();
            return;
        };
        let sentence_zh = self.translate_sentence_cached(sentence).await;
        let meaning = resolved_meaning(record);
        let mut explanation = format!("「{}」在此句中意为:{meaning}。", record.word);
        if let Some(zh) = &sentence_zh {
            explanation.push_str(&format!("整句可理解为:{zh}"));
        }
        record.context_sentence = Some(sentence.to_string());
        record.context_sentence_zh = sentence_zh;
        record.context_explanation_zh = Some(explanation);
    }

    async fn translate_sentence_cached(&self, sentence: &str) -> Option<String> {
        if let Some(cached) = self.sentence_cache.lock().get(sentence) {
            return Some(cached.clone());
        }
        let translated = self.translator.translate(sentence).await?;
        self.sentence_cache
            .lock()
            .put(sentence.to_string(), translated.clone());
        Some(translated)
    }
}

/// Meaning line for the context explanation: whole-word gloss, else the
/// first CJK-bearing definition translation, else the first raw
/// definition, else a generic placeholder.
fn resolved_meaning(record: &WordRecord) -> String {
    if let Some(zh) = record.translation_zh.as_deref().filter(|t| !t.is_empty()) {
        return zh.to_string();
    }
    if let Some(translated) = record
        .definitions
        .iter()
        .filter_map(|d| d.translation.as_deref())
        .find(|t| contains_cjk(t))
    {
        return translated.to_string();
    }
    record
        .definitions
        .first()
        .map(|d| d.definition.clone())
        .unwrap_or_else(|| "暂无释义".to_string())
}

/// Terminal synthetic record: the word/phrase is unresolved, but the
/// result stays structurally valid for display.
pub fn not_found_record(input: &str) -> WordRecord {
    let mut record = WordRecord::new(input);
    let mut item = DefinitionItem::new(
        "phrase",
        format!("短语“{input}”暂无词典直查结果，建议尝试查询核心单词。"),
    );
    item.example = Some(format!("Try searching key words from \"{input}\"."));
    item.translation = Some(format!("短语“{input}”暂无直查结果，可拆分后重试。"));
    record.definitions.push(item);
    record
}

/// Degraded outcome for unexpected provider trouble; never an unhandled
/// failure.
pub fn unavailable_record(input: &str) -> WordRecord {
    let mut record = WordRecord::new(input);
    let mut item = DefinitionItem::new("unknown", "词典服务暂时不可用，请稍后重试。");
    item.example = Some(format!("Try again later for \"{input}\"."));
    item.translation = Some("词典服务暂时不可用，请稍后重试。".to_string());
    record.definitions.push(item);
    record
}

fn choose_phonetic(
    phonetics: &[crate::providers::DictPhonetic],
    fallback: Option<&str>,
) -> Phonetic {
    let texts: Vec<&str> = phonetics
        .iter()
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect();
    if texts.is_empty() {
        return Phonetic::both(fallback.map(str::to_string));
    }
    let pick = |hints: &[&str]| -> Option<String> {
        texts
            .iter()
            .find(|t| {
                let lower = t.to_lowercase();
                hints.iter().any(|h| lower.contains(h))
            })
            .or_else(|| texts.first())
            .map(|t| (*t).to_string())
    };
    Phonetic {
        uk: pick(&["uk", "gb"]).or_else(|| fallback.map(str::to_string)),
        us: pick(&["us"]).or_else(|| fallback.map(str::to_string)),
    }
}

fn choose_audio(phonetics: &[crate::providers::DictPhonetic], locale: &str) -> Option<String> {
    let with_audio: Vec<&crate::providers::DictPhonetic> = phonetics
        .iter()
        .filter(|p| p.audio.as_deref().is_some_and(|a| !a.is_empty()))
        .collect();
    if with_audio.is_empty() {
        return None;
    }
    let hints: &[&str] = if locale == "uk" { &["uk", "gb"] } else { &["us"] };
    let chosen = with_audio
        .iter()
        .find(|p| {
            let haystack = format!(
                "{} {} {}",
                p.audio.as_deref().unwrap_or(""),
                p.source_url.as_deref().unwrap_or(""),
                p.text.as_deref().unwrap_or("")
            )
            .to_lowercase();
            hints.iter().any(|h| haystack.contains(h))
        })
        .unwrap_or(&with_audio[0]);
    chosen.audio.as_deref().map(secure_url)
}

/// Pronunciation clip URLs are normalized to a secure scheme.
fn secure_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{DictDefinition, DictMeaning, DictPhonetic, TranslationProvider};
    use crate::storage::LocalStore;
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubDictionary {
        entries: HashMap<String, DictEntry>,
        calls: Arc<AtomicUsize>,
    }

    impl StubDictionary {
        fn new(entries: HashMap<String, DictEntry>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    entries,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl DictionarySource for StubDictionary {
        async fn entries(&self, query: &str) -> Result<Option<Vec<DictEntry>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.get(query).map(|e| vec![e.clone()]))
        }
    }

    struct BrokenDictionary;

    #[async_trait]
    impl DictionarySource for BrokenDictionary {
        async fn entries(&self, _query: &str) -> Result<Option<Vec<DictEntry>>> {
            Err(crate::error::Error::Provider("connection reset".to_string()))
        }
    }

    struct StubPronouncer;

    #[async_trait]
    impl PronunciationSource for StubPronouncer {
        async fn pronounce(&self, _spelling: &str) -> Option<String> {
            None
        }
    }

    struct StubTranslation {
        seen: Arc<PlMutex<Vec<String>>>,
    }

    #[async_trait]
    impl TranslationProvider for StubTranslation {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn translate(&self, text: &str) -> Option<String> {
            self.seen.lock().push(text.to_string());
            Some(format!("译:{text}"))
        }
    }

    struct StubPrimary {
        record: Option<WordRecord>,
    }

    #[async_trait]
    impl PrimarySource for StubPrimary {
        async fn lookup(&self, _text: &str) -> Option<WordRecord> {
            self.record.clone()
        }
    }

    fn dict_entry(word: &str, defs: &[(&str, &str)]) -> DictEntry {
        DictEntry {
            word: Some(word.to_string()),
            phonetic: Some(format!("/{word}/")),
            phonetics: vec![],
            meanings: defs
                .iter()
                .map(|(pos, text)| DictMeaning {
                    part_of_speech: Some((*pos).to_string()),
                    definitions: vec![DictDefinition {
                        definition: Some((*text).to_string()),
                        example: None,
                    }],
                })
                .collect(),
        }
    }

    fn pipeline(
        dictionary: StubDictionary,
        primary: Option<Box<dyn PrimarySource>>,
    ) -> (LookupPipeline, Arc<PlMutex<Vec<String>>>) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let translator =
            Translator::with_providers(vec![Box::new(StubTranslation { seen: seen.clone() })]);
        let cache = LookupCache::new(Arc::new(LocalStore::ephemeral()));
        (
            LookupPipeline::with_sources(
                cache,
                primary,
                Box::new(dictionary),
                Box::new(StubPronouncer),
                translator,
            ),
            seen,
        )
    }

    #[tokio::test]
    async fn exhausted_chain_yields_structurally_valid_terminal_record() {
        let (dictionary, _) = StubDictionary::new(HashMap::new());
        let (pipeline, _) = pipeline(dictionary, Some(Box::new(StubPrimary { record: None })));
        let record = pipeline.lookup("frobnicate the widget", None).await;
        assert_eq!(record.word, "frobnicate the widget");
        assert!(!record.definitions.is_empty());
        assert!(record.definitions[0].definition.contains("暂无词典直查结果"));
        // Still CJK-translated where possible.
        assert!(record.translation_zh.is_some());
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_unavailable_record() {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let translator =
            Translator::with_providers(vec![Box::new(StubTranslation { seen })]);
        let pipeline = LookupPipeline::with_sources(
            LookupCache::new(Arc::new(LocalStore::ephemeral())),
            None,
            Box::new(BrokenDictionary),
            Box::new(StubPronouncer),
            translator,
        );
        let record = pipeline.lookup("apple", None).await;
        assert_eq!(record.word, "apple");
        assert_eq!(record.definitions[0].part_of_speech, "unknown");
        assert!(record.definitions[0].definition.contains("词典服务暂时不可用"));
        // Distinct from a clean miss, which reads as a not-found record.
        assert!(!record.definitions[0].definition.contains("暂无词典直查结果"));
    }

    #[tokio::test]
    async fn direct_hit_maps_and_truncates_definitions() {
        let mut entry = dict_entry("run", &[]);
        entry.meanings = vec![DictMeaning {
            part_of_speech: Some("verb".to_string()),
            definitions: (0..4)
                .map(|i| DictDefinition {
                    definition: Some(format!("sense {i}")),
                    example: None,
                })
                .collect(),
        }];
        let mut entries = HashMap::new();
        entries.insert("run".to_string(), entry);
        let (dictionary, _) = StubDictionary::new(entries);
        let (pipeline, _) = pipeline(dictionary, None);
        let record = pipeline.lookup("Run", None).await;
        assert_eq!(record.word, "run");
        // At most two definitions per part-of-speech group survive.
        assert_eq!(record.definitions.len(), 2);
        assert_eq!(record.phonetic.uk.as_deref(), Some("/run/"));
    }

    #[tokio::test]
    async fn cache_hit_skips_remote_calls() {
        let mut entries = HashMap::new();
        entries.insert("apple".to_string(), dict_entry("apple", &[("noun", "a fruit")]));
        let (dictionary, calls) = StubDictionary::new(entries);
        let (pipeline, _) = pipeline(dictionary, None);
        pipeline.lookup("apple", None).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let record = pipeline.lookup(" APPLE ", None).await;
        assert_eq!(record.word, "apple");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn phrase_fallback_uses_longest_keyword_first() {
        let mut entries = HashMap::new();
        entries.insert(
            "gravitation".to_string(),
            dict_entry("gravitation", &[("noun", "mutual attraction of masses")]),
        );
        let (dictionary, _) = StubDictionary::new(entries);
        let (pipeline, _) = pipeline(dictionary, None);
        let record = pipeline.lookup("law of gravitation", None).await;
        assert_eq!(record.word, "law of gravitation");
        assert!(record.definitions[0].definition.contains("gravitation"));
        assert!(record.definitions[0].definition.contains("未直接命中"));
        assert!(
            record
                .definitions
                .iter()
                .any(|d| d.definition.contains("mutual attraction"))
        );
    }

    #[tokio::test]
    async fn primary_backend_short_circuits_public_dictionary() {
        let mut primary_record = WordRecord::new("apple");
        primary_record
            .definitions
            .push(DefinitionItem::new("noun", "a fruit"));
        let (dictionary, _) = StubDictionary::new(HashMap::new());
        let (pipeline, _) = pipeline(
            dictionary,
            Some(Box::new(StubPrimary {
                record: Some(primary_record),
            })),
        );
        let record = pipeline.lookup("apple", None).await;
        assert_eq!(record.definitions[0].definition, "a fruit");
    }

    #[tokio::test]
    async fn context_sentence_is_applied_but_never_cached() {
        let mut entries = HashMap::new();
        entries.insert("fox".to_string(), dict_entry("fox", &[("noun", "a wild canine")]));
        let (dictionary, _) = StubDictionary::new(entries);
        let (pipeline, _) = pipeline(dictionary, None);
        let record = pipeline
            .lookup("fox", Some("The quick brown fox jumps."))
            .await;
        assert_eq!(
            record.context_sentence.as_deref(),
            Some("The quick brown fox jumps.")
        );
        assert!(record.context_explanation_zh.is_some());

        // A second lookup without context must not resurrect the fields.
        let cached = pipeline.lookup("fox", None).await;
        assert!(!cached.has_context());
    }

    #[tokio::test]
    async fn sentence_translation_is_cached_per_session() {
        let mut entries = HashMap::new();
        entries.insert("fox".to_string(), dict_entry("fox", &[("noun", "a wild canine")]));
        let (dictionary, _) = StubDictionary::new(entries);
        let (pipeline, seen) = pipeline(dictionary, None);
        let sentence = "The quick brown fox jumps.";
        pipeline.lookup("fox", Some(sentence)).await;
        pipeline.lookup("fox", Some(sentence)).await;
        let sentence_translations = seen
            .lock()
            .iter()
            .filter(|t| t.as_str() == sentence)
            .count();
        assert_eq!(sentence_translations, 1);
    }

    #[tokio::test]
    async fn apply_context_strip_is_idempotent() {
        let (dictionary, _) = StubDictionary::new(HashMap::new());
        let (pipeline, _) = pipeline(dictionary, None);
        let mut record = WordRecord::new("apple");
        record.definitions.push(DefinitionItem::new("noun", "a fruit"));
        let before = record.clone();
        pipeline.apply_context_info(&mut record, None).await;
        assert_eq!(record, before);
    }

    #[test]
    fn audio_urls_are_upgraded_to_https() {
        let phonetics = vec![DictPhonetic {
            text: Some("/rʌn/".to_string()),
            audio: Some("http://example.com/run-us.mp3".to_string()),
            source_url: None,
        }];
        assert_eq!(
            choose_audio(&phonetics, "us").as_deref(),
            Some("https://example.com/run-us.mp3")
        );
    }

    #[test]
    fn audio_locale_hint_is_respected() {
        let phonetics = vec![
            DictPhonetic {
                text: None,
                audio: Some("https://example.com/run-us.mp3".to_string()),
                source_url: None,
            },
            DictPhonetic {
                text: None,
                audio: Some("https://example.com/run-uk.mp3".to_string()),
                source_url: None,
            },
        ];
        assert_eq!(
            choose_audio(&phonetics, "uk").as_deref(),
            Some("https://example.com/run-uk.mp3")
        );
        assert_eq!(
            choose_audio(&phonetics, "us").as_deref(),
            Some("https://example.com/run-us.mp3")
        );
    }

    #[test]
    fn phonetic_falls_back_to_single_field() {
        let chosen = choose_phonetic(&[], Some("/rʌn/"));
        assert_eq!(chosen.uk.as_deref(), Some("/rʌn/"));
        assert_eq!(chosen.us.as_deref(), Some("/rʌn/"));
    }
}
