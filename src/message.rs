use crate::collection::{
    get_settings, get_username, set_settings, set_username, CollectionStore, ReviewQueue,
};
use crate::error::Result;
use crate::lookup::LookupPipeline;
use crate::providers::BackendClient;
use crate::storage::LocalStore;
use crate::types::{now_ms, CollectionSyncEntry, CollectionSyncPayload, WordRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// The runtime message contract between UI surfaces and the hub. The
/// JSON shape is `{"type": "LOOKUP_WORD", "payload": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeMessage {
    LookupWord { payload: LookupPayload },
    GetCollections,
    UpsertCollection { payload: UpsertPayload },
    DeleteCollection { payload: WordPayload },
    AddReviewQueue { payload: WordPayload },
    GetReviewQueue,
    DeleteReviewQueue { payload: WordPayload },
    ClearReviewQueue,
    GetUsername,
    SetUsername { payload: UsernamePayload },
    GetSettings,
    SetSettings { payload: Value },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupPayload {
    pub text: String,
    #[serde(default)]
    pub context_sentence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertPayload {
    pub data: WordRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordPayload {
    pub word: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsernamePayload {
    pub username: String,
}

/// Every request settles into this envelope; failures are data, never
/// an unanswered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuntimeResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Central dispatcher owning the pipeline and the persisted stores.
pub struct MessageHub {
    store: Arc<LocalStore>,
    pipeline: LookupPipeline,
    collections: CollectionStore,
    review_queue: ReviewQueue,
}

impl MessageHub {
    pub fn new(store: Arc<LocalStore>, pipeline: LookupPipeline) -> Self {
        Self {
            collections: CollectionStore::new(store.clone()),
            review_queue: ReviewQueue::new(store.clone()),
            store,
            pipeline,
        }
    }

    pub fn collections(&self) -> &CollectionStore {
        &self.collections
    }

    pub fn review_queue(&self) -> &ReviewQueue {
        &self.review_queue
    }

    /// Handle one message end to end. Internal errors become
    /// `{ok: false, error}` so a caller always gets an answer.
    pub async fn handle(&self, message: RuntimeMessage) -> RuntimeResponse {
        match self.dispatch(message).await {
            Ok(data) => RuntimeResponse::success(data),
            Err(err) => {
                warn!(error = %err, "message handling failed");
                RuntimeResponse::failure(err.to_string())
            }
        }
    }

    async fn dispatch(&self, message: RuntimeMessage) -> Result<Value> {
        match message {
            RuntimeMessage::LookupWord { payload } => {
                let record = self
                    .pipeline
                    .lookup(&payload.text, payload.context_sentence.as_deref())
                    .await;
                Ok(serde_json::to_value(record)?)
            }
            RuntimeMessage::GetCollections => Ok(serde_json::to_value(self.collections.list())?),
            RuntimeMessage::UpsertCollection { payload } => {
                self.collections.upsert(&payload.data).await?;
                Ok(Value::Null)
            }
            RuntimeMessage::DeleteCollection { payload } => {
                self.collections.remove(&payload.word).await?;
                Ok(Value::Null)
            }
            RuntimeMessage::AddReviewQueue { payload } => {
                let queued = self.review_queue.add(&payload.word).await?;
                Ok(json!({ "queued": queued }))
            }
            RuntimeMessage::GetReviewQueue => {
                Ok(serde_json::to_value(self.review_queue.list())?)
            }
            RuntimeMessage::DeleteReviewQueue { payload } => {
                self.review_queue.delete(&payload.word).await?;
                Ok(Value::Null)
            }
            RuntimeMessage::ClearReviewQueue => {
                self.review_queue.clear().await?;
                Ok(Value::Null)
            }
            RuntimeMessage::GetUsername => Ok(match get_username(&self.store) {
                Some(username) => Value::String(username),
                None => Value::Null,
            }),
            RuntimeMessage::SetUsername { payload } => {
                set_username(&self.store, &payload.username).await?;
                Ok(Value::Bool(true))
            }
            RuntimeMessage::GetSettings => Ok(serde_json::to_value(get_settings(&self.store))?),
            RuntimeMessage::SetSettings { payload } => {
                let settings = set_settings(&self.store, &payload).await?;
                Ok(serde_json::to_value(settings)?)
            }
        }
    }

    /// Push the local collection map to the backend and adopt the merged
    /// state it returns. Requires a stored username.
    pub async fn sync_collections(&self) -> Result<usize> {
        let Some(username) = get_username(&self.store) else {
            info!("collection sync skipped, no username configured");
            return Ok(0);
        };
        let Some(client) = BackendClient::from_env(Some(username)) else {
            info!("collection sync skipped, no backend configured");
            return Ok(0);
        };
        self.sync_collections_with(&client).await
    }

    pub async fn sync_collections_with(&self, client: &BackendClient) -> Result<usize> {
        let local = self.collections.list();
        let words: Vec<CollectionSyncEntry> = local
            .into_iter()
            .map(|(word, data)| CollectionSyncEntry {
                word,
                collected_at: data.collected_at.unwrap_or_else(now_ms),
                data,
            })
            .collect();
        let merged: HashMap<String, WordRecord> = client
            .sync_collections(&CollectionSyncPayload { words })
            .await?;
        let count = merged.len();
        self.collections.replace_all(&merged).await?;
        info!(collections = count, "collection sync complete");
        Ok(count)
    }
}
