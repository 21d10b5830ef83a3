use crate::providers::{GoogleWebTranslator, MyMemoryTranslator, TranslationProvider};
use crate::text::contains_cjk;
use crate::types::WordRecord;
use futures::future::join_all;
use tracing::debug;

/// Ordered provider chain; the first acceptable result wins. Acceptable
/// means non-empty, CJK-bearing, and not a case-insensitive echo of the
/// input (providers sometimes return the source text untouched).
pub struct Translator {
    providers: Vec<Box<dyn TranslationProvider>>,
}

impl Default for Translator {
    fn default() -> Self {
        Self {
            providers: vec![Box::new(GoogleWebTranslator), Box::new(MyMemoryTranslator)],
        }
    }
}

impl Translator {
    pub fn with_providers(providers: Vec<Box<dyn TranslationProvider>>) -> Self {
        Self { providers }
    }

    /// Absence is a normal, displayable state, not a fault.
    pub async fn translate(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        for provider in &self.providers {
            match provider.translate(trimmed).await {
                Some(result) if is_acceptable(trimmed, &result) => {
                    debug!(provider = provider.name(), "translation accepted");
                    return Some(result);
                }
                Some(_) => debug!(provider = provider.name(), "translation rejected"),
                None => debug!(provider = provider.name(), "translation unavailable"),
            }
        }
        None
    }

    /// Idempotent enrichment: re-translates only the slots whose current
    /// translation lacks CJK content, so partially-translated cached
    /// records complete incrementally without redundant calls.
    ///
    /// Definition- and example-level translations run concurrently; the
    /// job vectors are slot-indexed, so results merge back into their
    /// original definitions and order is preserved.
    pub async fn ensure_translation(&self, record: &mut WordRecord) {
        if needs_translation(record.translation_zh.as_deref()) {
            record.translation_zh = self.translate(&record.word.clone()).await;
        }

        let definition_jobs: Vec<Option<String>> = record
            .definitions
            .iter()
            .map(|def| {
                needs_translation(def.translation.as_deref()).then(|| def.definition.clone())
            })
            .collect();
        let example_jobs: Vec<Option<String>> = record
            .definitions
            .iter()
            .map(|def| {
                def.example
                    .clone()
                    .filter(|_| needs_translation(def.example_translation.as_deref()))
            })
            .collect();

        let translated_definitions =
            join_all(definition_jobs.iter().map(|job| self.translate_optional(job.as_deref())))
                .await;
        let translated_examples =
            join_all(example_jobs.iter().map(|job| self.translate_optional(job.as_deref())))
                .await;

        for (slot, translated) in record.definitions.iter_mut().zip(translated_definitions) {
            if let Some(text) = translated {
                slot.translation = Some(text);
            }
        }
        for (slot, translated) in record.definitions.iter_mut().zip(translated_examples) {
            if let Some(text) = translated {
                slot.example_translation = Some(text);
            }
        }
    }

    async fn translate_optional(&self, text: Option<&str>) -> Option<String> {
        match text {
            Some(text) => self.translate(text).await,
            None => None,
        }
    }
}

fn is_acceptable(input: &str, result: &str) -> bool {
    !result.is_empty()
        && contains_cjk(result)
        && !result.eq_ignore_ascii_case(input)
}

fn needs_translation(current: Option<&str>) -> bool {
    match current {
        Some(text) => !contains_cjk(text),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DefinitionItem;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        reply: Option<&'static str>,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedProvider {
        fn new(reply: Option<&'static str>) -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    reply,
                    calls: calls.clone(),
                    seen: seen.clone(),
                },
                calls,
                seen,
            )
        }
    }

    #[async_trait]
    impl TranslationProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn translate(&self, text: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(text.to_string());
            self.reply.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn first_acceptable_provider_wins() {
        let (failing, failing_calls, _) = ScriptedProvider::new(None);
        let (echoing, _, _) = ScriptedProvider::new(Some("apple"));
        let (good, _, _) = ScriptedProvider::new(Some("苹果"));
        let (unreached, unreached_calls, _) = ScriptedProvider::new(Some("梨"));
        let translator = Translator::with_providers(vec![
            Box::new(failing),
            Box::new(echoing),
            Box::new(good),
            Box::new(unreached),
        ]);
        assert_eq!(translator.translate("apple").await.as_deref(), Some("苹果"));
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(unreached_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_non_cjk_results() {
        let (latin_only, _, _) = ScriptedProvider::new(Some("pomme"));
        let translator = Translator::with_providers(vec![Box::new(latin_only)]);
        assert_eq!(translator.translate("apple").await, None);
    }

    #[tokio::test]
    async fn all_failures_yield_absence() {
        let (failing, _, _) = ScriptedProvider::new(None);
        let translator = Translator::with_providers(vec![Box::new(failing)]);
        assert_eq!(translator.translate("apple").await, None);
        assert_eq!(translator.translate("   ").await, None);
    }

    struct GatedProvider {
        barrier: Arc<tokio::sync::Barrier>,
    }

    #[async_trait]
    impl TranslationProvider for GatedProvider {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn translate(&self, text: &str) -> Option<String> {
            self.barrier.wait().await;
            Some(format!("译{text}"))
        }
    }

    #[tokio::test]
    async fn definition_slots_translate_concurrently() {
        // Both definition jobs must be in flight at once to clear the
        // barrier; serial execution would park on the first wait.
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let translator = Translator::with_providers(vec![Box::new(GatedProvider { barrier })]);

        let mut record = WordRecord::new("apple");
        record.translation_zh = Some("苹果".to_string());
        record.definitions = vec![
            DefinitionItem::new("noun", "a fruit"),
            DefinitionItem::new("verb", "to gather apples"),
        ];

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            translator.ensure_translation(&mut record),
        )
        .await
        .unwrap();

        assert_eq!(record.definitions[0].translation.as_deref(), Some("译a fruit"));
        assert_eq!(
            record.definitions[1].translation.as_deref(),
            Some("译to gather apples")
        );
    }

    #[tokio::test]
    async fn ensure_translation_fills_missing_slots_only() {
        let (provider, calls, seen) = ScriptedProvider::new(Some("中文结果"));
        let translator = Translator::with_providers(vec![Box::new(provider)]);

        let mut record = WordRecord::new("apple");
        record.translation_zh = Some("苹果".to_string());
        let mut translated = DefinitionItem::new("noun", "a fruit");
        translated.translation = Some("一种水果".to_string());
        let mut pending = DefinitionItem::new("verb", "to gather apples");
        pending.example = Some("We apple in autumn.".to_string());
        record.definitions = vec![translated.clone(), pending];

        translator.ensure_translation(&mut record).await;

        // Word and first definition already carried CJK: untouched.
        assert_eq!(record.translation_zh.as_deref(), Some("苹果"));
        assert_eq!(record.definitions[0].translation.as_deref(), Some("一种水果"));
        assert_eq!(record.definitions[1].translation.as_deref(), Some("中文结果"));
        assert_eq!(
            record.definitions[1].example_translation.as_deref(),
            Some("中文结果")
        );
        let seen = seen.lock();
        assert!(!seen.iter().any(|t| t == "a fruit"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Second pass is a no-op: every slot now has CJK content.
        drop(seen);
    }

    #[tokio::test]
    async fn ensure_translation_is_idempotent() {
        let (provider, calls, _) = ScriptedProvider::new(Some("中文结果"));
        let translator = Translator::with_providers(vec![Box::new(provider)]);
        let mut record = WordRecord::new("apple");
        record.definitions = vec![DefinitionItem::new("noun", "a fruit")];
        translator.ensure_translation(&mut record).await;
        let after_first = calls.load(Ordering::SeqCst);
        let snapshot = record.clone();
        translator.ensure_translation(&mut record).await;
        assert_eq!(record, snapshot);
        assert_eq!(calls.load(Ordering::SeqCst), after_first);
    }
}
