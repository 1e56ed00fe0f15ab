//! JSON file backend.
//!
//! The whole store lives in one file holding `{ key: { value, expires_at } }`.
//! Each mutation rewrites the file through a temporary sibling and a rename,
//! so readers never observe a half-written document.

use crate::{DurableKv, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl FileEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// File-backed store surviving process restarts.
pub struct FileKv {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, FileEntry>>,
}

impl FileKv {
    /// Open (or lazily create) the store at `path`. Expired entries are
    /// dropped on load.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut entries: BTreeMap<String, FileEntry> = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| StorageError::Encoding(format!("{}: {}", path.display(), e)))?
            }
        } else {
            BTreeMap::new()
        };

        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        if entries.len() != before {
            tracing::debug!(
                path = %path.display(),
                pruned = before - entries.len(),
                "Pruned expired entries"
            );
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, FileEntry>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        restrict_permissions(&tmp);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "Failed to tighten permissions on credential file"
        );
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

fn expiry_from(max_age: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl DurableKv for FileKv {
    fn set(&self, key: &str, value: &str, max_age: Duration) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at: expiry_from(max_age),
            },
        );
        self.persist(&entries)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| entry.value.clone()))
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.remove(key) {
            Some(entry) => {
                self.persist(&entries)?;
                Ok(entry.is_live(Utc::now()))
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_get_remove() {
        let dir = tempdir().unwrap();
        let store = FileKv::open(dir.path().join("kv.json")).unwrap();

        store.set("access", "a-1", Duration::from_secs(60)).unwrap();
        assert_eq!(store.get("access").unwrap(), Some("a-1".to_string()));

        assert!(store.remove("access").unwrap());
        assert_eq!(store.get("access").unwrap(), None);
        assert!(!store.remove("access").unwrap());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.json");

        {
            let store = FileKv::open(&path).unwrap();
            store.set("access", "a-1", Duration::from_secs(60)).unwrap();
            store.set("refresh", "r-1", Duration::from_secs(600)).unwrap();
        }

        let store = FileKv::open(&path).unwrap();
        assert_eq!(store.get("access").unwrap(), Some("a-1".to_string()));
        assert_eq!(store.get("refresh").unwrap(), Some("r-1".to_string()));
        assert!(!dir.path().join("nested").join("kv.json.tmp").exists());
    }

    #[test]
    fn test_expired_entries_pruned_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");

        {
            let store = FileKv::open(&path).unwrap();
            store.set("stale", "x", Duration::ZERO).unwrap();
            store.set("fresh", "y", Duration::from_secs(60)).unwrap();
        }

        let store = FileKv::open(&path).unwrap();
        assert_eq!(store.get("stale").unwrap(), None);
        assert_eq!(store.get("fresh").unwrap(), Some("y".to_string()));
        let entries = store.entries.lock().unwrap();
        assert!(!entries.contains_key("stale"));
    }

    #[test]
    fn test_empty_file_opens_as_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, "").unwrap();

        let store = FileKv::open(&path).unwrap();
        assert_eq!(store.get("access").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            FileKv::open(&path),
            Err(StorageError::Encoding(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.json");
        let store = FileKv::open(&path).unwrap();
        store.set("access", "a-1", Duration::from_secs(60)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
