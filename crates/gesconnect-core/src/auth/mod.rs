//! Authentication module for managing the user's session.
//!
//! This module provides:
//! - `TokenStore`: the access/refresh token pair over a pluggable
//!   `KeyValueStore` (memory, JSON file, or OS keychain)
//! - `RefreshCoordinator`: coalesced refresh-token exchange
//! - `SessionGuard`: entry check for protected views
//! - `RenewalLoop`: background proactive renewal

pub mod credentials;
pub mod file_store;
pub mod guard;
pub mod refresh;
pub mod renewal;
pub mod store;
pub mod tokens;

pub use credentials::KeyringStore;
pub use file_store::FileStore;
pub use guard::{GuardMode, GuardOutcome, Navigator, SessionGuard, ViewScope};
pub use refresh::RefreshCoordinator;
pub use renewal::RenewalLoop;
pub use store::{AnyStore, KeyValueStore, MemoryStore};
pub use tokens::{CredentialPair, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
