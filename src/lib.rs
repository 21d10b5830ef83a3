pub mod cache;
pub mod collection;
pub mod error;
pub mod highlight;
pub mod lookup;
pub mod message;
pub mod morphology;
pub mod providers;
pub mod storage;
pub mod text;
pub mod translate;
pub mod types;
pub mod ui;
pub mod watcher;
#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, Result};
pub use lookup::LookupPipeline;
pub use message::{MessageHub, RuntimeMessage, RuntimeResponse};
pub use storage::LocalStore;
pub use types::{Settings, WordRecord};
