use keyring::Entry;
use tracing::warn;

use super::store::KeyValueStore;

const SERVICE_NAME: &str = "gesconnect";

/// Token store backed by the OS keychain, one entry per key.
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        match Entry::new(&self.service, key) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to create keyring entry");
                None
            }
        }
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(entry) = self.entry(key) {
            if let Err(e) = entry.set_password(value) {
                warn!(key = key, error = %e, "Failed to store token in keychain");
            }
        }
    }

    fn clear(&self, key: &str) {
        if let Some(entry) = self.entry(key) {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => warn!(key = key, error = %e, "Failed to delete token from keychain"),
            }
        }
    }
}
