//! Exchange of the stored refresh token for a new credential pair.
//!
//! Concurrent callers are coalesced: a single-flight gate serializes
//! exchanges, and a caller that queued behind an in-flight exchange takes
//! that exchange's outcome instead of spending the (possibly rotated)
//! refresh token again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use super::tokens::{CredentialPair, TokenStore};
use crate::api::models::{RefreshRequest, TokenResponse};
use crate::api::transport::{HttpRequest, Transport};
use crate::api::ApiError;

/// Result of the most recent completed exchange.
struct LastRefresh {
    generation: u64,
    outcome: Result<(), ApiError>,
}

pub struct RefreshCoordinator<S, T> {
    store: Arc<TokenStore<S>>,
    transport: Arc<T>,
    refresh_path: String,
    gate: Mutex<LastRefresh>,
    /// Mirrors `gate.generation` so callers can sample it before queueing.
    generation: AtomicU64,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag even if the exchange future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: KeyValueStore, T: Transport> RefreshCoordinator<S, T> {
    pub fn new(store: Arc<TokenStore<S>>, transport: Arc<T>, refresh_path: &str) -> Self {
        Self {
            store,
            transport,
            refresh_path: refresh_path.to_string(),
            gate: Mutex::new(LastRefresh {
                generation: 0,
                outcome: Ok(()),
            }),
            generation: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of exchanges that have completed (successfully or not).
    pub fn completed(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Refresh unconditionally, joining an exchange already in flight.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.refresh_stale(None).await
    }

    /// Refresh because `stale` was rejected with a 401.
    ///
    /// Returns without touching the network when the store already holds a
    /// different access token, i.e. another caller renewed it meanwhile.
    pub async fn refresh_stale(&self, stale: Option<&str>) -> Result<(), ApiError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let mut last = self.gate.lock().await;

        if last.generation != seen {
            debug!(generation = last.generation, "Joined concurrent token refresh");
            return last.outcome.clone();
        }

        if let (Some(stale), Some(current)) = (stale, self.store.access_token()) {
            if stale != current {
                debug!("Access token already renewed, skipping refresh");
                return Ok(());
            }
        }

        let outcome = {
            let _in_flight = InFlight::enter(&self.in_flight);
            self.exchange().await
        };

        last.generation += 1;
        last.outcome = outcome.clone();
        self.generation.store(last.generation, Ordering::SeqCst);
        outcome
    }

    async fn exchange(&self) -> Result<(), ApiError> {
        let (epoch, refresh_token) = self.store.refresh_token_at_epoch();
        let Some(refresh_token) = refresh_token else {
            warn!("Token refresh requested without a refresh token");
            self.store.clear_if_epoch(epoch);
            return Err(ApiError::NoRefreshToken);
        };

        match self.request_pair(&refresh_token).await {
            Ok(pair) if self.store.replace_if_epoch(&pair, epoch) => {
                info!("Access token refreshed");
                Ok(())
            }
            Ok(_) => {
                // Logout or a new login happened while the request was out
                info!("Session changed during token refresh, discarding new tokens");
                if self.store.has_access_token() {
                    Ok(())
                } else {
                    Err(ApiError::Unauthenticated)
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.store.clear_if_epoch(epoch);
                Err(e)
            }
        }
    }

    async fn request_pair(&self, refresh_token: &str) -> Result<CredentialPair, ApiError> {
        let request = HttpRequest::new(Method::POST, self.refresh_path.as_str())
            .json_body(&RefreshRequest { refresh_token })?;
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            debug!(status = %response.status, "Refresh endpoint rejected token");
            return Err(ApiError::Unauthenticated);
        }

        let tokens: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            warn!(error = %e, "Malformed refresh response");
            ApiError::Unauthenticated
        })?;

        let Some(access_token) = tokens.access_token.filter(|t| !t.is_empty()) else {
            warn!("Refresh response missing access_token");
            return Err(ApiError::Unauthenticated);
        };

        // The backend may keep the refresh token instead of rotating it
        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(CredentialPair {
            access_token,
            refresh_token,
        })
    }
}
