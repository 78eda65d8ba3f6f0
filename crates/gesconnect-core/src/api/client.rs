//! Authenticated fetch against the GES Connect API.
//!
//! Every call runs through a small state machine so that a request is
//! refreshed and retried at most once, and only when the *original*
//! attempt was rejected with 401:
//!
//! | phase        | event           | next         |
//! |--------------|-----------------|--------------|
//! | `Idle`       | `Start`         | `Requesting` |
//! | `Requesting` | `Succeeded`     | `Complete`   |
//! | `Requesting` | `Unauthorized`  | `Refreshing` |
//! | `Requesting` | `Rejected`      | `Failed`     |
//! | `Refreshing` | `Refreshed`     | `Retrying`   |
//! | `Refreshing` | `RefreshFailed` | `Failed`     |
//! | `Retrying`   | `Succeeded`     | `Complete`   |
//! | `Retrying`   | `Unauthorized`  | `Failed`     |
//! | `Retrying`   | `Rejected`      | `Failed`     |

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::models::{AddStepsRequest, AddStepsResponse, UserProfile, WeeklySteps};
use super::transport::{HttpRequest, HttpResponse, Transport};
use super::ApiError;
use crate::auth::{KeyValueStore, RefreshCoordinator, TokenStore};

const WEEKLY_STEPS_PATH: &str = "/steps/week?metric_key=steps";
const ADD_STEPS_PATH: &str = "/steps/add";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Requesting,
    Refreshing,
    Retrying,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Start,
    /// 2xx response
    Succeeded,
    /// 401 on an authorized request
    Unauthorized,
    /// Any other failure, including transport errors
    Rejected,
    Refreshed,
    RefreshFailed,
}

/// Transition table for one logical call. `None` marks an event that
/// cannot occur in that phase.
pub(crate) fn transition(phase: Phase, event: Event) -> Option<Phase> {
    use Event::*;
    use Phase::*;

    match (phase, event) {
        (Idle, Start) => Some(Requesting),
        (Requesting, Succeeded) | (Retrying, Succeeded) => Some(Complete),
        (Requesting, Unauthorized) => Some(Refreshing),
        (Requesting, Rejected) | (Retrying, Rejected) | (Retrying, Unauthorized) => Some(Failed),
        (Refreshing, Refreshed) => Some(Retrying),
        (Refreshing, RefreshFailed) => Some(Failed),
        _ => None,
    }
}

/// API client performing bearer-authorized requests with one transparent
/// refresh-and-retry on token expiry.
/// Clone is cheap - all shared state is behind `Arc`.
pub struct ApiClient<S, T> {
    store: Arc<TokenStore<S>>,
    transport: Arc<T>,
    refresher: Arc<RefreshCoordinator<S, T>>,
    me_path: String,
}

impl<S, T> Clone for ApiClient<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            refresher: Arc::clone(&self.refresher),
            me_path: self.me_path.clone(),
        }
    }
}

impl<S: KeyValueStore, T: Transport> ApiClient<S, T> {
    pub fn new(
        store: Arc<TokenStore<S>>,
        transport: Arc<T>,
        refresher: Arc<RefreshCoordinator<S, T>>,
        me_path: &str,
    ) -> Self {
        Self {
            store,
            transport,
            refresher,
            me_path: me_path.to_string(),
        }
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.request(Method::GET, path, None, true).await
    }

    pub async fn post<R: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.request(Method::POST, path, Some(body), true).await
    }

    /// Perform one logical call.
    ///
    /// With `auth` set, a missing access token fails immediately with
    /// [`ApiError::Unauthenticated`] and a 401 triggers at most one refresh
    /// followed by at most one retry. Without it, no header is sent and a
    /// 401 is an ordinary [`ApiError::Http`].
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        auth: bool,
    ) -> Result<R, ApiError> {
        let response = self.execute(method, path, body, auth).await?;
        parse_body(path, &response)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        auth: bool,
    ) -> Result<HttpResponse, ApiError> {
        let mut phase = advance(Phase::Idle, Event::Start);
        let mut sent_token: Option<String> = None;
        let mut last_response: Option<HttpResponse> = None;
        let mut failure: Option<ApiError> = None;

        loop {
            match phase {
                Phase::Requesting | Phase::Retrying => {
                    let token = if auth {
                        match self.store.access_token() {
                            Some(token) => Some(token),
                            None => {
                                debug!(path = path, "No access token for authorized request");
                                return Err(ApiError::Unauthenticated);
                            }
                        }
                    } else {
                        None
                    };

                    let mut request = HttpRequest::new(method.clone(), path);
                    request.body = body.clone();
                    request.bearer = token.clone();
                    sent_token = token;

                    let event = match self.transport.send(request).await {
                        Ok(response) => {
                            let event = if response.is_success() {
                                Event::Succeeded
                            } else if auth && response.status == StatusCode::UNAUTHORIZED {
                                Event::Unauthorized
                            } else {
                                Event::Rejected
                            };
                            last_response = Some(response);
                            event
                        }
                        Err(e) => {
                            warn!(path = path, error = %e, "Request failed");
                            failure = Some(e);
                            Event::Rejected
                        }
                    };

                    if phase == Phase::Retrying && event == Event::Unauthorized {
                        // The fresh token was refused too; nothing left to try
                        warn!(path = path, "Retried request still unauthorized, clearing session");
                        self.store.clear();
                    }
                    phase = advance(phase, event);
                }
                Phase::Refreshing => {
                    debug!(path = path, "Access token rejected, refreshing");
                    let event = match self.refresher.refresh_stale(sent_token.as_deref()).await {
                        Ok(()) => Event::Refreshed,
                        Err(e) => {
                            debug!(path = path, error = %e, "Refresh failed");
                            failure = Some(ApiError::Unauthenticated);
                            Event::RefreshFailed
                        }
                    };
                    phase = advance(phase, event);
                }
                Phase::Complete => {
                    return last_response
                        .ok_or_else(|| ApiError::InvalidResponse("missing response".to_string()));
                }
                Phase::Failed => {
                    if let Some(e) = failure {
                        return Err(e);
                    }
                    return Err(match last_response {
                        Some(response) => ApiError::from_status(response.status, &response.body),
                        None => ApiError::InvalidResponse("request failed without a response".to_string()),
                    });
                }
                Phase::Idle => phase = advance(phase, Event::Start),
            }
        }
    }

    // ===== Typed endpoints =====

    /// Liveness probe: who the current access token belongs to.
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.get(&self.me_path).await
    }

    /// Step totals for the current challenge week
    pub async fn weekly_steps(&self) -> Result<WeeklySteps, ApiError> {
        self.get(WEEKLY_STEPS_PATH).await
    }

    /// Log steps (defaults to today on the server)
    pub async fn add_steps(&self, request: &AddStepsRequest) -> Result<AddStepsResponse, ApiError> {
        self.post(ADD_STEPS_PATH, request).await
    }
}

fn advance(phase: Phase, event: Event) -> Phase {
    transition(phase, event).unwrap_or_else(|| {
        warn!(?phase, ?event, "Invalid request transition");
        Phase::Failed
    })
}

pub(crate) fn parse_body<R: DeserializeOwned>(path: &str, response: &HttpResponse) -> Result<R, ApiError> {
    let body = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(body).map_err(|e| {
        ApiError::InvalidResponse(format!(
            "Failed to parse JSON response from {}: {} ({})",
            path,
            e,
            ApiError::truncate_body(&response.body)
        ))
    })
}
