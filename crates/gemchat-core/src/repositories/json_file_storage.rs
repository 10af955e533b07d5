use std::path::{Path, PathBuf};

use super::error::{StorageError, StorageResult};
use super::storage_backend::{BoxFuture, KeyValueStorage};

/// File-backed storage: each key is a `<key>.json` file in one directory.
/// Default location is ~/.config/gemchat/
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Create storage in the platform config directory
    pub fn new() -> StorageResult<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| StorageError::InitializationError {
                message: "Could not determine config directory".to_string(),
            })?
            .join("gemchat");

        Ok(Self { dir })
    }

    /// Create storage in a custom directory (for testing or `--storage-dir`)
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let path = self.key_path(key);

        Box::pin(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StorageError::IoError(e)),
            }
        })
    }

    fn write(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.key_path(key);
        let dir = self.dir.clone();

        Box::pin(async move {
            tokio::fs::create_dir_all(&dir).await?;

            // Write atomically (write to temp, then rename)
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, value).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.key_path(key);

        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::IoError(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_dir(dir.path());

        assert!(storage.read("conversations").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_dir(dir.path().join("nested"));

        storage
            .write("conversations", "[1,2,3]".to_string())
            .await
            .unwrap();

        let value = storage.read("conversations").await.unwrap();
        assert_eq!(value.as_deref(), Some("[1,2,3]"));
        assert!(dir.path().join("nested").join("conversations.json").exists());
        assert!(
            !dir.path()
                .join("nested")
                .join("conversations.json.tmp")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_write_replaces_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_dir(dir.path());

        storage.write("k", "first".to_string()).await.unwrap();
        storage.write("k", "second".to_string()).await.unwrap();

        assert_eq!(storage.read("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_dir(dir.path());

        storage.write("k", "v".to_string()).await.unwrap();
        storage.remove("k").await.unwrap();
        storage.remove("k").await.unwrap();

        assert!(storage.read("k").await.unwrap().is_none());
    }
}
