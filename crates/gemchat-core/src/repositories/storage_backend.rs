use std::future::Future;
use std::pin::Pin;

use super::error::StorageResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key under which the whole conversation collection is stored
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Key used by the single-thread chat page before conversations existed
pub const LEGACY_HISTORY_KEY: &str = "chatHistory";

/// Durable key-value storage, scoped to one user/profile.
///
/// Values are opaque strings. A `write` must replace the previous value
/// atomically: readers see either the old blob or the new one, never a mix.
pub trait KeyValueStorage: Send + Sync + 'static {
    /// Read the value for `key`, `None` if it was never written
    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;

    /// Replace the value for `key`
    fn write(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
}
