pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced to callers of the message hub and backend surface.
///
/// Provider failures carry this type between lookup stages but never
/// escape the pipeline: it degrades them to fallback records per the
/// strategy chain. What callers see is validation and storage trouble.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("X-Username is required")]
    MissingUsername,

    #[error("storage error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("storage error: {0}")]
    StorageCodec(#[from] serde_json::Error),

    #[error("backend request failed: {0}")]
    Backend(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),
}
