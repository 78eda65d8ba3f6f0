//! # gesconnect-core
//!
//! Session lifecycle for clients of the GES Connect API.
//!
//! - [`auth`] - token persistence, refresh coordination, the entry guard
//!   for protected views and the background renewal loop
//! - [`api`] - authenticated fetch with one transparent refresh-and-retry,
//!   the HTTP transport seam and wire types
//! - [`session`] - [`SessionManager`], which owns all of the above
//! - [`config`] - on-disk configuration and endpoint settings
//!
//! ```rust,ignore
//! use gesconnect_core::{Config, FileStore, ReqwestTransport, SessionManager};
//!
//! let config = Config::load()?;
//! let transport = ReqwestTransport::new(&config.api_base_url(), config.request_timeout())?;
//! let session = SessionManager::new(
//!     config.session_config(),
//!     FileStore::new(config.cache_dir()?),
//!     transport,
//! );
//!
//! if !session.restore().await {
//!     session.login("a@b.com", "secret").await?;
//! }
//! let week = session.client().weekly_steps().await?;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, ReqwestTransport, Transport};
pub use auth::{
    AnyStore, CredentialPair, FileStore, GuardMode, GuardOutcome, KeyValueStore, KeyringStore, MemoryStore,
    Navigator, TokenStore, ViewScope,
};
pub use config::{Config, SessionConfig, TokenBackend};
pub use session::{SessionManager, SessionState};
