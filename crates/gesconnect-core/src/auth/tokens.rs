use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::store::KeyValueStore;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access/refresh token pair. Both are opaque bearer strings and are
/// never decoded client-side.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Typed view over a [`KeyValueStore`] holding the credential pair.
///
/// Pair writes go through one lock so a reader never sees the access token
/// of one refresh next to the refresh token of another. Every pair write
/// bumps an epoch, which lets a slow writer detect that the session it
/// started from has since been replaced or logged out.
///
/// [`access_token`](Self::access_token) and
/// [`refresh_token`](Self::refresh_token) read without the lock; use
/// [`credentials`](Self::credentials) or
/// [`refresh_token_at_epoch`](Self::refresh_token_at_epoch) when the value
/// must belong to one pair write.
pub struct TokenStore<S> {
    backend: S,
    write_lock: Mutex<()>,
    epoch: AtomicU64,
}

impl<S: KeyValueStore> TokenStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn access_token(&self) -> Option<String> {
        self.backend.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.backend.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Number of pair writes so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Snapshot of both tokens, `None` unless both are present.
    pub fn credentials(&self) -> Option<CredentialPair> {
        let _guard = self.lock();
        Some(CredentialPair {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
        })
    }

    /// The refresh token together with the epoch it was read at.
    pub fn refresh_token_at_epoch(&self) -> (u64, Option<String>) {
        let _guard = self.lock();
        (self.epoch(), self.refresh_token())
    }

    /// Overwrite both tokens.
    pub fn replace(&self, pair: &CredentialPair) {
        let _guard = self.lock();
        self.write_pair(pair);
    }

    /// Overwrite both tokens unless another write happened after `epoch`.
    pub fn replace_if_epoch(&self, pair: &CredentialPair, epoch: u64) -> bool {
        let _guard = self.lock();
        if self.epoch() != epoch {
            return false;
        }
        self.write_pair(pair);
        true
    }

    /// Store an access token issued without a refresh token. Any older
    /// refresh token is dropped so the two never belong to different logins.
    pub fn replace_access_only(&self, access_token: &str) {
        let _guard = self.lock();
        self.backend.set(ACCESS_TOKEN_KEY, access_token);
        self.backend.clear(REFRESH_TOKEN_KEY);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove both tokens. Idempotent.
    pub fn clear(&self) {
        let _guard = self.lock();
        self.clear_pair();
    }

    /// Remove both tokens unless another write happened after `epoch`.
    pub fn clear_if_epoch(&self, epoch: u64) -> bool {
        let _guard = self.lock();
        if self.epoch() != epoch {
            return false;
        }
        self.clear_pair();
        true
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    // The guarded data lives in the backend, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_pair(&self, pair: &CredentialPair) {
        self.backend.set(ACCESS_TOKEN_KEY, &pair.access_token);
        self.backend.set(REFRESH_TOKEN_KEY, &pair.refresh_token);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_pair(&self) {
        self.backend.clear(ACCESS_TOKEN_KEY);
        self.backend.clear(REFRESH_TOKEN_KEY);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;

    #[test]
    fn test_replace_and_clear() {
        let store = TokenStore::new(MemoryStore::new());
        assert!(store.credentials().is_none());
        assert!(!store.has_access_token());

        store.replace(&CredentialPair::new("A1", "R1"));
        assert_eq!(store.credentials(), Some(CredentialPair::new("A1", "R1")));

        store.replace(&CredentialPair::new("A2", "R2"));
        assert_eq!(store.access_token().as_deref(), Some("A2"));
        assert_eq!(store.refresh_token().as_deref(), Some("R2"));

        store.clear();
        assert!(store.credentials().is_none());
        assert!(store.backend().is_empty());
        store.clear();
    }

    #[test]
    fn test_partial_pair_is_not_credentials() {
        let store = TokenStore::new(MemoryStore::new());
        store.backend().set(ACCESS_TOKEN_KEY, "A1");
        assert!(store.has_access_token());
        assert!(store.credentials().is_none());
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let store = TokenStore::new(MemoryStore::new());
        store.backend().set(ACCESS_TOKEN_KEY, "");
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_conditional_writes_lose_to_later_writes() {
        let store = TokenStore::new(MemoryStore::new());
        store.replace(&CredentialPair::new("A1", "R1"));
        let (epoch, refresh) = store.refresh_token_at_epoch();
        assert_eq!(refresh.as_deref(), Some("R1"));

        store.clear();
        assert!(!store.replace_if_epoch(&CredentialPair::new("A2", "R2"), epoch));
        assert!(store.credentials().is_none());

        store.replace(&CredentialPair::new("A3", "R3"));
        assert!(!store.clear_if_epoch(epoch));
        assert_eq!(store.credentials(), Some(CredentialPair::new("A3", "R3")));

        let current = store.epoch();
        assert!(store.replace_if_epoch(&CredentialPair::new("A4", "R4"), current));
        assert_eq!(store.credentials(), Some(CredentialPair::new("A4", "R4")));
        assert!(store.clear_if_epoch(store.epoch()));
        assert!(store.backend().is_empty());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", CredentialPair::new("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret"));
    }
}
