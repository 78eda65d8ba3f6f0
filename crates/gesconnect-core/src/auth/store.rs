use std::collections::HashMap;
use std::sync::Mutex;

use super::credentials::KeyringStore;
use super::file_store::FileStore;

/// Durable key-value persistence for session tokens.
///
/// Backends never surface errors: a medium that cannot be written (full
/// disk, locked keychain) logs a warning and leaves the key absent or
/// unchanged. Callers must tolerate absence.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    /// Idempotent.
    fn clear(&self, key: &str);
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn clear(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

/// Backend picked at runtime from configuration.
pub enum AnyStore {
    File(FileStore),
    Keyring(KeyringStore),
    Memory(MemoryStore),
}

impl AnyStore {
    fn inner(&self) -> &dyn KeyValueStore {
        match self {
            AnyStore::File(store) => store,
            AnyStore::Keyring(store) => store,
            AnyStore::Memory(store) => store,
        }
    }
}

impl KeyValueStore for AnyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner().get(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.inner().set(key, value)
    }

    fn clear(&self, key: &str) {
        self.inner().clear(key)
    }
}
