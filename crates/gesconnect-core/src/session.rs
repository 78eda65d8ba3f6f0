//! The session lifecycle, owned by one injectable manager.
//!
//! `SessionManager` wires the token store, transport, refresh coordinator,
//! API client, guard and renewal loop together. Hosts create one per
//! signed-in user and pass it by reference to whatever needs the API.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::client::parse_body;
use crate::api::models::{LoginRequest, SignupRequest, SignupResponse, TokenResponse};
use crate::api::transport::{HttpRequest, Transport};
use crate::api::{ApiClient, ApiError};
use crate::auth::{
    CredentialPair, GuardMode, GuardOutcome, KeyValueStore, Navigator, RefreshCoordinator,
    RenewalLoop, SessionGuard, TokenStore, ViewScope,
};
use crate::config::SessionConfig;

/// Derived from the stored tokens and any refresh in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

pub struct SessionManager<S, T> {
    config: SessionConfig,
    store: Arc<TokenStore<S>>,
    transport: Arc<T>,
    refresher: Arc<RefreshCoordinator<S, T>>,
    client: ApiClient<S, T>,
    guard: SessionGuard<S, T>,
    renewal: RenewalLoop,
}

impl<S: KeyValueStore, T: Transport> SessionManager<S, T> {
    pub fn new(config: SessionConfig, backend: S, transport: T) -> Self {
        let store = Arc::new(TokenStore::new(backend));
        let transport = Arc::new(transport);
        let refresher = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            &config.refresh_path,
        ));
        let client = ApiClient::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            Arc::clone(&refresher),
            &config.me_path,
        );
        let guard = SessionGuard::new(Arc::clone(&store), client.clone(), &config.login_route);
        let renewal = RenewalLoop::new(config.renewal_interval);

        Self {
            config,
            store,
            transport,
            refresher,
            client,
            guard,
            renewal,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient<S, T> {
        &self.client
    }

    pub fn guard(&self) -> &SessionGuard<S, T> {
        &self.guard
    }

    pub fn store(&self) -> &TokenStore<S> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        if self.refresher.is_refreshing() {
            SessionState::Refreshing
        } else if self.store.has_access_token() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Exchange email and password for a token pair and start renewal.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let tokens: TokenResponse = self
            .post_credentials(
                &self.config.login_path,
                &LoginRequest { email, password },
                "Login failed",
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                e
            })?;

        let Some(access_token) = tokens.access_token.filter(|t| !t.is_empty()) else {
            return Err(ApiError::InvalidResponse(
                "Login response missing access_token".to_string(),
            ));
        };

        match tokens.refresh_token.filter(|t| !t.is_empty()) {
            Some(refresh_token) => self.store.replace(&CredentialPair {
                access_token,
                refresh_token,
            }),
            None => {
                warn!("Login response carried no refresh token; session cannot be renewed");
                self.store.replace_access_only(&access_token);
            }
        }

        info!("Login successful");
        self.start_renewal();
        Ok(())
    }

    /// Create an account. No tokens are issued; log in afterwards.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupResponse, ApiError> {
        let account: SignupResponse = self
            .post_credentials(
                &self.config.signup_path,
                &SignupRequest {
                    name,
                    email,
                    password,
                },
                "Signup failed",
            )
            .await?;
        info!(id = %account.id, "Account created");
        Ok(account)
    }

    /// Restore a session persisted by an earlier run.
    ///
    /// A stored access token counts as a session; without one, the refresh
    /// token is exchanged. On success the renewal loop is started.
    pub async fn restore(&self) -> bool {
        let authenticated = if self.store.has_access_token() {
            true
        } else {
            match self.refresher.refresh().await {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Could not restore session from refresh token");
                    false
                }
            }
        };

        if authenticated {
            info!("Session restored");
            self.start_renewal();
        } else {
            info!("No valid session found");
        }
        authenticated
    }

    /// Run the entry check for a protected view.
    pub async fn check(
        &self,
        mode: GuardMode,
        navigator: &dyn Navigator,
        scope: &ViewScope,
    ) -> GuardOutcome {
        self.guard.check(mode, navigator, scope).await
    }

    /// Refresh now, outside the renewal schedule.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.refresher.refresh().await
    }

    /// Stop renewal, forget the tokens and send the user to login.
    pub fn logout(&self, navigator: &dyn Navigator) -> GuardOutcome {
        self.renewal.stop();
        self.store.clear();
        info!("Logged out");
        self.guard.send_to_login(navigator, &ViewScope::new())
    }

    pub fn renewal_running(&self) -> bool {
        self.renewal.is_running()
    }

    /// Stop background work without touching the stored session.
    pub fn shutdown(&self) {
        self.renewal.stop();
    }

    /// Unauthenticated POST to a login-style endpoint. The server's
    /// `detail`/`message` is kept; anything else becomes `fallback`.
    async fn post_credentials<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<R, ApiError> {
        let request = HttpRequest::new(Method::POST, path).json_body(body)?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status_or(response.status, &response.body, fallback));
        }
        parse_body(path, &response)
    }

    fn start_renewal(&self) {
        let refresher = Arc::clone(&self.refresher);
        self.renewal.start(move || {
            let refresher = Arc::clone(&refresher);
            async move {
                match refresher.refresh().await {
                    Ok(()) => true,
                    Err(e) => {
                        // The store is cleared; the next guarded call will send the user to login
                        warn!(error = %e, "Background refresh failed - user will need to log in again");
                        false
                    }
                }
            }
        });
    }
}
