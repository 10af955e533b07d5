pub mod error;
pub mod in_memory_storage;
pub mod json_file_storage;
pub mod snapshot;
pub mod storage_backend;

pub use error::{StorageError, StorageResult};
pub use in_memory_storage::InMemoryStorage;
pub use json_file_storage::JsonFileStorage;
pub use storage_backend::{BoxFuture, CONVERSATIONS_KEY, KeyValueStorage, LEGACY_HISTORY_KEY};
