use crate::error::Result;
use crate::storage::{KEY_LOOKUP_CACHE, LocalStore};
use crate::text::normalize_lookup_key;
use crate::types::{LOOKUP_CACHE_MAX, LookupCacheEntry, WordRecord, now_ms};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static CACHE_SEQ: AtomicU64 = AtomicU64::new(1);

pub type LookupCacheMap = HashMap<String, LookupCacheEntry>;

/// Bounded lookup-result cache keyed by normalized query text, backed by
/// the host's local storage. Records are stored context-stripped; when the
/// resolved word differs from the query key an alias entry is written so
/// lookups by either form hit.
pub struct LookupCache {
    store: Arc<LocalStore>,
    max_entries: usize,
}

impl LookupCache {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            max_entries: LOOKUP_CACHE_MAX,
        }
    }

    #[cfg(test)]
    pub fn with_capacity(store: Arc<LocalStore>, max_entries: usize) -> Self {
        Self { store, max_entries }
    }

    pub fn get(&self, query: &str) -> Option<WordRecord> {
        let key = normalize_lookup_key(query);
        let map: LookupCacheMap = self.store.get(KEY_LOOKUP_CACHE)?;
        map.get(&key).map(|entry| entry.data.clone())
    }

    pub async fn set(&self, query: &str, record: &WordRecord) -> Result<()> {
        let key = normalize_lookup_key(query);
        let mut data = record.clone();
        data.strip_context();
        data.collected_at = None;

        let mut map: LookupCacheMap = self.store.get(KEY_LOOKUP_CACHE).unwrap_or_default();
        let entry = LookupCacheEntry {
            data: data.clone(),
            cached_at: now_ms(),
            seq: CACHE_SEQ.fetch_add(1, Ordering::Relaxed),
        };
        let canonical = normalize_lookup_key(&data.word);
        if canonical != key && !canonical.is_empty() {
            map.insert(canonical, entry.clone());
        }
        map.insert(key.clone(), entry);
        let map = prune_lookup_cache(map, self.max_entries);
        debug!(key = %key, entries = map.len(), "lookup cache updated");
        self.store.set(KEY_LOOKUP_CACHE, &map).await
    }
}

/// Keep the `max` most recently-cached entries, sequence number breaking
/// same-millisecond ties. Idempotent and order-independent for the cap
/// property, so racing writers that each prune after their own insert
/// still settle under the cap.
pub fn prune_lookup_cache(cache: LookupCacheMap, max: usize) -> LookupCacheMap {
    if cache.len() <= max {
        return cache;
    }
    let mut entries: Vec<_> = cache.into_iter().collect();
    entries.sort_by(|a, b| {
        (b.1.cached_at, b.1.seq).cmp(&(a.1.cached_at, a.1.seq))
    });
    entries.truncate(max);
    entries.into_iter().collect()
}
