use crate::error::Result;
use crate::storage::{
    KEY_COLLECTIONS, KEY_REVIEW_QUEUE, KEY_SETTINGS, KEY_USERNAME, LocalStore,
};
use crate::text::normalize_lookup_key;
use crate::types::{REVIEW_QUEUE_MAX, ReviewQueueItem, Settings, WordRecord, now_ms, normalize_settings};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// The user's saved word set. Independent of the lookup cache: collecting
/// a word never touches cached lookups, and vice versa. The highlighter
/// reads this map's key set and nothing else.
pub struct CollectionStore {
    store: Arc<LocalStore>,
}

impl CollectionStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> HashMap<String, WordRecord> {
        self.store.get(KEY_COLLECTIONS).unwrap_or_default()
    }

    pub fn words(&self) -> Vec<String> {
        self.list().into_keys().collect()
    }

    pub async fn upsert(&self, record: &WordRecord) -> Result<()> {
        let key = normalize_lookup_key(&record.word);
        let mut map = self.list();
        let mut stored = record.clone();
        stored.collected_at = Some(now_ms());
        map.insert(key.clone(), stored);
        info!(word = %key, total = map.len(), "collection upsert");
        self.store.set(KEY_COLLECTIONS, &map).await
    }

    pub async fn remove(&self, word: &str) -> Result<()> {
        let key = normalize_lookup_key(word);
        let mut map = self.list();
        map.remove(&key);
        self.store.set(KEY_COLLECTIONS, &map).await
    }

    /// Replace the whole map, used after a sync returns the server's
    /// authoritative merged state.
    pub async fn replace_all(&self, map: &HashMap<String, WordRecord>) -> Result<()> {
        self.store.set(KEY_COLLECTIONS, map).await
    }
}

/// Bounded most-recent-first review list, deduplicated by word.
pub struct ReviewQueue {
    store: Arc<LocalStore>,
}

impl ReviewQueue {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Vec<ReviewQueueItem> {
        self.store.get(KEY_REVIEW_QUEUE).unwrap_or_default()
    }

    /// Returns false when the word normalizes to nothing or is already
    /// queued. Oldest entries fall off the tail past the cap.
    pub async fn add(&self, word: &str) -> Result<bool> {
        let normalized = normalize_lookup_key(word);
        if normalized.is_empty() {
            return Ok(false);
        }
        let mut queue = self.list();
        if queue.iter().any(|item| item.word == normalized) {
            return Ok(false);
        }
        queue.insert(
            0,
            ReviewQueueItem {
                word: normalized,
                added_at: now_ms(),
            },
        );
        queue.truncate(REVIEW_QUEUE_MAX);
        self.store.set(KEY_REVIEW_QUEUE, &queue).await?;
        Ok(true)
    }

    pub async fn delete(&self, word: &str) -> Result<()> {
        let normalized = normalize_lookup_key(word);
        if normalized.is_empty() {
            return Ok(());
        }
        let queue: Vec<_> = self
            .list()
            .into_iter()
            .filter(|item| item.word != normalized)
            .collect();
        self.store.set(KEY_REVIEW_QUEUE, &queue).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.set(KEY_REVIEW_QUEUE, &Vec::<ReviewQueueItem>::new()).await
    }
}

pub fn get_username(store: &LocalStore) -> Option<String> {
    store.get::<String>(KEY_USERNAME).filter(|u| !u.is_empty())
}

pub async fn set_username(store: &LocalStore, username: &str) -> Result<()> {
    store.set(KEY_USERNAME, &username.trim()).await
}

pub fn get_settings(store: &LocalStore) -> Settings {
    normalize_settings(store.get_raw(KEY_SETTINGS).as_ref())
}

/// Merge a partial settings patch over the stored value and normalize; the
/// normalized result is what gets persisted and returned.
pub async fn set_settings(store: &LocalStore, patch: &serde_json::Value) -> Result<Settings> {
    let mut current = store
        .get_raw(KEY_SETTINGS)
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    if let Some(fields) = patch.as_object() {
        for (key, value) in fields {
            current.insert(key.clone(), value.clone());
        }
    }
    let merged = normalize_settings(Some(&serde_json::Value::Object(current)));
    store.set(KEY_SETTINGS, &merged).await?;
    Ok(merged)
}
