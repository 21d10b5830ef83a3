use crate::error::Result;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

pub const KEY_LOOKUP_CACHE: &str = "word_lookup_cache";
pub const KEY_COLLECTIONS: &str = "collections";
pub const KEY_REVIEW_QUEUE: &str = "review_queue";
pub const KEY_USERNAME: &str = "username";
pub const KEY_SETTINGS: &str = "settings";

/// Host-local persistent key-value storage: one JSON document holding the
/// lookup cache, collection map, review queue, username, and settings
/// under namespaced keys.
///
/// Writes are last-writer-wins; the callers that share keys
/// (cache prune, collection upserts) are idempotent or serialized by
/// interaction pacing, so no finer locking is attempted.
pub struct LocalStore {
    path: Option<PathBuf>,
    inner: RwLock<HashMap<String, serde_json::Value>>,
}

impl LocalStore {
    /// Open (or create) a store backed by a JSON file. An unreadable or
    /// corrupt file is treated as empty rather than fatal.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(error = %err, path = %path.display(), "discarding corrupt store file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path: Some(path),
            inner: RwLock::new(inner),
        }
    }

    /// In-memory store for tests and one-shot CLI runs.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let guard = self.inner.read();
        let value = guard.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().get(key).cloned()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)?;
        let snapshot = {
            let mut guard = self.inner.write();
            guard.insert(key.to_string(), encoded);
            match &self.path {
                Some(_) => Some(serde_json::to_vec(&*guard)?),
                None => None,
            }
        };
        if let (Some(path), Some(bytes)) = (&self.path, snapshot) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, bytes).await?;
        }
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let snapshot = {
            let mut guard = self.inner.write();
            guard.remove(key);
            match &self.path {
                Some(_) => Some(serde_json::to_vec(&*guard)?),
                None => None,
            }
        };
        if let (Some(path), Some(bytes)) = (&self.path, snapshot) {
            tokio::fs::write(path, bytes).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_round_trip() {
        let store = LocalStore::ephemeral();
        store.set(KEY_USERNAME, &"evan").await.unwrap();
        assert_eq!(store.get::<String>(KEY_USERNAME).as_deref(), Some("evan"));
        store.remove(KEY_USERNAME).await.unwrap();
        assert_eq!(store.get::<String>(KEY_USERNAME), None);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = LocalStore::persistent(&path);
            store.set(KEY_USERNAME, &"evan").await.unwrap();
        }
        let reopened = LocalStore::persistent(&path);
        assert_eq!(
            reopened.get::<String>(KEY_USERNAME).as_deref(),
            Some("evan")
        );
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = LocalStore::persistent(&path);
        assert_eq!(store.get::<String>(KEY_USERNAME), None);
        store.set(KEY_USERNAME, &"new").await.unwrap();
        assert_eq!(store.get::<String>(KEY_USERNAME).as_deref(), Some("new"));
    }
}
