//! Storage trait definitions.

use crate::StorageResult;
use std::time::Duration;

/// Durable key/value capability with per-entry expiry.
///
/// Implementations must treat an entry whose max-age has elapsed exactly
/// like a missing one.
pub trait DurableKv: Send + Sync {
    /// Store `value` under `key` for at most `max_age`.
    fn set(&self, key: &str, value: &str, max_age: Duration) -> StorageResult<()>;

    /// Retrieve a live value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a value. Returns whether a live value was present.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a live value exists.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
