//! Entry check for protected views.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use super::tokens::TokenStore;
use crate::api::transport::Transport;
use crate::api::ApiClient;

/// Moves the user between routes (screens, pages, CLI prompts).
pub trait Navigator: Send + Sync {
    fn current_route(&self) -> String;
    fn redirect(&self, route: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Trust a stored access token without asking the server
    TokenOnly,
    /// Confirm the token with the liveness endpoint (may refresh once)
    LivenessProbe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The view may render
    Authenticated,
    /// The user was sent to the login route
    Redirected,
    /// No session, but already on the login route
    Unauthenticated,
    /// The view went away before the check resolved; nothing was done
    Stale,
}

/// Liveness flag for the view a check runs on behalf of.
#[derive(Debug, Clone)]
pub struct ViewScope {
    mounted: Arc<AtomicBool>,
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewScope {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

pub struct SessionGuard<S, T> {
    store: Arc<TokenStore<S>>,
    client: ApiClient<S, T>,
    login_route: String,
}

impl<S: KeyValueStore, T: Transport> SessionGuard<S, T> {
    pub fn new(store: Arc<TokenStore<S>>, client: ApiClient<S, T>, login_route: &str) -> Self {
        Self {
            store,
            client,
            login_route: login_route.to_string(),
        }
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub async fn check(
        &self,
        mode: GuardMode,
        navigator: &dyn Navigator,
        scope: &ViewScope,
    ) -> GuardOutcome {
        if !self.store.has_access_token() {
            debug!("No access token on guarded entry");
            return self.send_to_login(navigator, scope);
        }

        if mode == GuardMode::TokenOnly {
            return GuardOutcome::Authenticated;
        }

        let probe = self.client.me().await;
        if !scope.is_mounted() {
            debug!("View unmounted during liveness probe, ignoring result");
            return GuardOutcome::Stale;
        }

        match probe {
            Ok(_) => GuardOutcome::Authenticated,
            Err(e) if e.is_auth_failure() => {
                info!(error = %e, "Session could not be restored");
                self.send_to_login(navigator, scope)
            }
            Err(e) => {
                // Fail open: an unrelated server or network error must not lock the user out
                warn!(error = %e, "Liveness probe failed, keeping session");
                GuardOutcome::Authenticated
            }
        }
    }

    /// Redirect to login unless already there (no redirect loops).
    pub(crate) fn send_to_login(&self, navigator: &dyn Navigator, scope: &ViewScope) -> GuardOutcome {
        if !scope.is_mounted() {
            return GuardOutcome::Stale;
        }
        if navigator.current_route() == self.login_route {
            return GuardOutcome::Unauthenticated;
        }
        navigator.redirect(&self.login_route);
        GuardOutcome::Redirected
    }
}
