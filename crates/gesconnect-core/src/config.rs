//! Application configuration management.
//!
//! Configuration is stored at `~/.config/gesconnect/config.json`; every
//! field is optional and falls back to the defaults below. The API base
//! URL can also be set with `GES_API_BASE_URL`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::auth::{AnyStore, FileStore, KeyringStore, MemoryStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gesconnect";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_BASE_URL_ENV: &str = "GES_API_BASE_URL";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Proactive renewal period. Tokens are opaque, so renewal is purely
/// time-based; 4 minutes keeps a 5 minute access token from lapsing.
pub const DEFAULT_RENEWAL_INTERVAL_SECS: u64 = 240;

pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Endpoint paths and timings used by the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub login_path: String,
    pub signup_path: String,
    pub refresh_path: String,
    /// Liveness probe ("who am I")
    pub me_path: String,
    /// Where the session guard sends unauthenticated users
    pub login_route: String,
    pub renewal_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_path: "/auth/login".to_string(),
            signup_path: "/auth/signup".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            me_path: "/api/me".to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            renewal_interval: Duration::from_secs(DEFAULT_RENEWAL_INTERVAL_SECS),
        }
    }
}

/// Where tokens are persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    /// JSON file in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Process memory only
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub token_backend: TokenBackend,
    pub renewal_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Probe the API on guarded commands instead of trusting the stored token
    pub liveness_check: bool,
    pub login_route: String,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            token_backend: TokenBackend::default(),
            renewal_interval_secs: DEFAULT_RENEWAL_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            liveness_check: true,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL from the environment, then the config file, then the default.
    pub fn api_base_url(&self) -> String {
        self.resolve_base_url(std::env::var(API_BASE_URL_ENV).ok())
    }

    fn resolve_base_url(&self, from_env: Option<String>) -> String {
        from_env
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Open the token store selected by `token_backend`.
    pub fn open_store(&self) -> Result<AnyStore> {
        Ok(match self.token_backend {
            TokenBackend::File => AnyStore::File(FileStore::new(self.cache_dir()?)),
            TokenBackend::Keyring => AnyStore::Keyring(KeyringStore::default()),
            TokenBackend::Memory => AnyStore::Memory(MemoryStore::new()),
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            login_route: self.login_route.clone(),
            renewal_interval: Duration::from_secs(self.renewal_interval_secs.max(1)),
            ..SessionConfig::default()
        }
    }
}
