use crate::error::Result;
use crate::types::WordRecord;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

static HTTP: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!("pagegloss/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
});

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

// ---------------------------------------------------------------------------
// Public dictionary provider (REMOTE_FALLBACK_DIRECT)

#[derive(Debug, Clone, Deserialize)]
pub struct DictEntry {
    pub word: Option<String>,
    pub phonetic: Option<String>,
    #[serde(default)]
    pub phonetics: Vec<DictPhonetic>,
    #[serde(default)]
    pub meanings: Vec<DictMeaning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DictPhonetic {
    pub text: Option<String>,
    pub audio: Option<String>,
    #[serde(rename = "sourceUrl")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DictMeaning {
    #[serde(rename = "partOfSpeech")]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub definitions: Vec<DictDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DictDefinition {
    pub definition: Option<String>,
    pub example: Option<String>,
}

/// A dictionary source answers with raw entries, a clean miss, or an
/// error. A miss lets the lookup chain fall through to the next
/// strategy; an error terminates it with a service-unavailable record.
#[async_trait]
pub trait DictionarySource: Send + Sync {
    async fn entries(&self, query: &str) -> Result<Option<Vec<DictEntry>>>;
}

pub struct FreeDictionaryApi {
    base: String,
}

impl FreeDictionaryApi {
    pub fn from_env() -> Self {
        Self {
            base: std::env::var("DICTIONARY_API_BASE")
                .unwrap_or_else(|_| "https://api.dictionaryapi.dev/api/v2/entries/en".to_string()),
        }
    }
}

#[async_trait]
impl DictionarySource for FreeDictionaryApi {
    async fn entries(&self, query: &str) -> Result<Option<Vec<DictEntry>>> {
        let url = format!("{}/{}", self.base, encode_component(query));
        let response = HTTP.get(&url).send().await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), query, "dictionary provider miss");
            return Ok(None);
        }
        let entries: Vec<DictEntry> = response.json().await?;
        Ok(if entries.is_empty() { None } else { Some(entries) })
    }
}

// ---------------------------------------------------------------------------
// Translation providers, tried in order (first acceptable result wins)

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// Best-effort translation to Chinese; failures are absence.
    async fn translate(&self, text: &str) -> Option<String>;
}

/// Unofficial Google web endpoint; segmented response, joined back up.
pub struct GoogleWebTranslator;

#[async_trait]
impl TranslationProvider for GoogleWebTranslator {
    fn name(&self) -> &'static str {
        "google-web"
    }

    async fn translate(&self, text: &str) -> Option<String> {
        let url = format!(
            "https://translate.googleapis.com/translate_a/single?client=gtx&sl=auto&tl=zh-CN&dt=t&q={}",
            encode_component(text)
        );
        let payload: serde_json::Value = HTTP.get(&url).send().await.ok()?.json().await.ok()?;
        let segments = payload.get(0)?.as_array()?;
        let joined: String = segments
            .iter()
            .filter_map(|seg| seg.get(0)?.as_str())
            .collect();
        let joined = joined.trim().to_string();
        if joined.is_empty() { None } else { Some(joined) }
    }
}

#[derive(Debug, Deserialize)]
struct MyMemoryResponse {
    #[serde(rename = "responseData")]
    response_data: MyMemoryData,
}

#[derive(Debug, Deserialize)]
struct MyMemoryData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

pub struct MyMemoryTranslator;

#[async_trait]
impl TranslationProvider for MyMemoryTranslator {
    fn name(&self) -> &'static str {
        "mymemory"
    }

    async fn translate(&self, text: &str) -> Option<String> {
        let url = format!(
            "https://api.mymemory.translated.net/get?q={}&langpair=en|zh-CN",
            encode_component(text)
        );
        let payload: MyMemoryResponse = HTTP.get(&url).send().await.ok()?.json().await.ok()?;
        payload
            .response_data
            .translated_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Pronunciation-by-spelling provider

#[async_trait]
pub trait PronunciationSource: Send + Sync {
    /// ARPABET-like transcription for a spelled token, if any.
    async fn pronounce(&self, spelling: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct DatamuseWord {
    #[serde(default)]
    tags: Vec<String>,
}

pub struct DatamusePronouncer;

#[async_trait]
impl PronunciationSource for DatamusePronouncer {
    async fn pronounce(&self, spelling: &str) -> Option<String> {
        let url = format!(
            "https://api.datamuse.com/words?sp={}&md=r&max=1",
            encode_component(spelling)
        );
        let words: Vec<DatamuseWord> = HTTP.get(&url).send().await.ok()?.json().await.ok()?;
        words.first()?.tags.iter().find_map(|tag| {
            tag.strip_prefix("pron:")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
        })
    }
}

// ---------------------------------------------------------------------------
// First-party backend (REMOTE_PRIMARY)

/// A primary source resolves a query to a fully mapped record, or declines
/// so the chain can fall through to the public provider.
#[async_trait]
pub trait PrimarySource: Send + Sync {
    async fn lookup(&self, text: &str) -> Option<WordRecord>;
}

pub struct BackendClient {
    base: String,
    username: Option<String>,
}

impl BackendClient {
    pub fn new(base: impl Into<String>, username: Option<String>) -> Self {
        Self {
            base: base.into(),
            username,
        }
    }

    pub fn from_env(username: Option<String>) -> Option<Self> {
        let base = std::env::var("PAGEGLOSS_API_BASE").ok()?;
        Some(Self::new(base, username))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = HTTP.request(method, format!("{}{}", self.base, path));
        if let Some(username) = &self.username {
            builder = builder.header("X-Username", username);
        }
        builder
    }

    /// Push the full local collection map; the response is the server's
    /// authoritative merged state.
    pub async fn sync_collections(
        &self,
        payload: &crate::types::CollectionSyncPayload,
    ) -> crate::error::Result<std::collections::HashMap<String, WordRecord>> {
        let response = self
            .request(reqwest::Method::POST, "/api/collections")
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PrimarySource for BackendClient {
    async fn lookup(&self, text: &str) -> Option<WordRecord> {
        let path = format!("/api/word?word={}", encode_component(text));
        let response = match self.request(reqwest::Method::GET, &path).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "primary backend unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "primary backend miss");
            return None;
        }
        response.json().await.ok()
    }
}
