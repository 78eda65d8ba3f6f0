use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store::KeyValueStore;

/// Token file name in cache directory
const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    updated_at: DateTime<Utc>,
}

/// Token store persisted as JSON in the user's cache directory, so a
/// session survives process restarts.
pub struct FileStore {
    cache_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(TOKEN_FILE)
    }

    /// When the value under `key` was last written.
    pub fn updated_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let _guard = self.lock.lock().ok()?;
        self.load().ok()?.get(key).map(|v| v.updated_at)
    }

    fn load(&self) -> Result<HashMap<String, StoredValue>> {
        let path = self.path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn save(&self, values: &HashMap<String, StoredValue>) -> Result<()> {
        let path = self.path();
        if values.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove token file")?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        write_private(&path, &contents).context("Failed to write token file")
    }

    fn modify(&self, key: &str, op: impl FnOnce(&mut HashMap<String, StoredValue>)) {
        let Ok(_guard) = self.lock.lock() else {
            return;
        };
        let mut values = match self.load() {
            Ok(values) => values,
            Err(e) => {
                // A corrupt file holds nothing usable; start over
                warn!(error = %e, "Discarding unreadable token file");
                HashMap::new()
            }
        };
        op(&mut values);
        if let Err(e) = self.save(&values) {
            warn!(key = key, error = %e, "Failed to persist token");
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        match self.load() {
            Ok(values) => values.get(key).map(|v| v.value.clone()),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to load token file");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        self.modify(key, |values| {
            values.insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    updated_at: Utc::now(),
                },
            );
        });
    }

    fn clear(&self, key: &str) {
        self.modify(key, |values| {
            values.remove(key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gesconnect-file-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_values_survive_a_new_instance() {
        let dir = temp_dir("reload");
        let store = FileStore::new(dir.clone());
        store.set("access_token", "A1");
        store.set("refresh_token", "R1");

        let reopened = FileStore::new(dir.clone());
        assert_eq!(reopened.get("access_token").as_deref(), Some("A1"));
        assert_eq!(reopened.get("refresh_token").as_deref(), Some("R1"));
        assert!(reopened.updated_at("access_token").is_some());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_clear_removes_file_when_empty() {
        let dir = temp_dir("clear");
        let store = FileStore::new(dir.clone());
        store.set("access_token", "A1");
        assert!(store.path().exists());

        store.clear("access_token");
        assert_eq!(store.get("access_token"), None);
        assert!(!store.path().exists());
        // Idempotent
        store.clear("access_token");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_corrupt_file_reads_as_absent() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).expect("create dir");
        let store = FileStore::new(dir.clone());
        std::fs::write(store.path(), "not json").expect("write garbage");

        assert_eq!(store.get("access_token"), None);
        store.set("access_token", "A1");
        assert_eq!(store.get("access_token").as_deref(), Some("A1"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
