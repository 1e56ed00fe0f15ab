//! In-memory backend.

use crate::{DurableKv, StorageResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local store. Entries vanish with the process.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableKv for MemoryKv {
    fn set(&self, key: &str, value: &str, max_age: Duration) -> StorageResult<()> {
        let now = Instant::now();
        let expires_at = now.checked_add(max_age).unwrap_or(now);
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let now = Instant::now();
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        match data.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let now = Instant::now();
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.remove(key).is_some_and(|e| e.is_live(now)))
    }
}
