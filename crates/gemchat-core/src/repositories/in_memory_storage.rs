use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::error::{StorageError, StorageResult};
use super::storage_backend::{BoxFuture, KeyValueStorage};

/// In-memory key-value storage
/// Useful for testing and development. Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    write_count: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing the write counter
    pub fn insert_raw(&self, key: &str, value: impl Into<String>) {
        self.values.lock().insert(key.to_string(), value.into());
    }

    /// Current raw value for `key`
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Make every subsequent write fail (simulates a full quota)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail (simulates a transient I/O error)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StorageError::IoError(std::io::Error::other("storage unavailable")))
            });
        }

        let value = self.get_raw(key);
        Box::pin(async move { Ok(value) })
    }

    fn write(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let values = self.values.clone();
        let fail_writes = self.fail_writes.clone();
        let write_count = self.write_count.clone();
        let key = key.to_string();

        Box::pin(async move {
            if fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::InvalidData {
                    message: "storage quota exceeded".to_string(),
                });
            }

            values.lock().insert(key, value);
            write_count.fetch_add(1, Ordering::SeqCst);

            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let values = self.values.clone();
        let key = key.to_string();

        Box::pin(async move {
            values.lock().remove(&key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let storage = InMemoryStorage::new();

        storage.write("k", "v".to_string()).await.unwrap();

        assert_eq!(storage.read("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let storage = InMemoryStorage::new();
        let other = storage.clone();

        storage.write("k", "v".to_string()).await.unwrap();

        assert_eq!(other.get_raw("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_failing_writes_leave_value_untouched() {
        let storage = InMemoryStorage::new();
        storage.insert_raw("k", "old");
        storage.set_fail_writes(true);

        assert!(storage.write("k", "new".to_string()).await.is_err());
        assert_eq!(storage.get_raw("k").as_deref(), Some("old"));
        assert_eq!(storage.write_count(), 0);
    }
}
