//! In-process fake of the GES Connect backend used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Method, StatusCode};

use crate::api::transport::{HttpRequest, HttpResponse, Transport};
use crate::api::ApiError;
use crate::auth::CredentialPair;

#[derive(Default)]
struct BackendState {
    users: HashMap<String, (String, CredentialPair)>,
    valid_access: HashSet<String>,
    rotations: HashMap<String, CredentialPair>,
    forced_status: HashMap<String, (StatusCode, String)>,
    offline_paths: HashSet<String>,
    refresh_delay: Option<Duration>,
}

/// Behaves like the real API: protected routes answer 401 unless the
/// bearer token is one it issued, and `/auth/refresh` rotates pairs
/// registered with [`MockBackend::rotate`].
#[derive(Default)]
pub(crate) struct MockBackend {
    state: Mutex<BackendState>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, email: &str, password: &str, pair: CredentialPair) -> Self {
        self.state
            .lock()
            .expect("state")
            .users
            .insert(email.to_string(), (password.to_string(), pair));
        self
    }

    pub fn accept(self, access_token: &str) -> Self {
        self.state.lock().expect("state").valid_access.insert(access_token.to_string());
        self
    }

    /// Refreshing with `refresh_token` yields `next`, which becomes valid.
    pub fn rotate(self, refresh_token: &str, next: CredentialPair) -> Self {
        self.state
            .lock()
            .expect("state")
            .rotations
            .insert(refresh_token.to_string(), next);
        self
    }

    pub fn force_status(self, path: &str, status: StatusCode) -> Self {
        self.force_response(path, status, r#"{"detail":"forced failure"}"#)
    }

    pub fn force_response(self, path: &str, status: StatusCode, body: &str) -> Self {
        self.state
            .lock()
            .expect("state")
            .forced_status
            .insert(path.to_string(), (status, body.to_string()));
        self
    }

    pub fn offline(self, path: &str) -> Self {
        self.state.lock().expect("state").offline_paths.insert(path.to_string());
        self
    }

    pub fn refresh_delay(self, delay: Duration) -> Self {
        self.state.lock().expect("state").refresh_delay = Some(delay);
        self
    }

    pub fn revoke(&self, access_token: &str) {
        self.state.lock().expect("state").valid_access.remove(access_token);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    /// Bearer tokens sent to `path`, in order.
    pub fn bearers(&self, path: &str) -> Vec<Option<String>> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .map(|r| r.bearer)
            .collect()
    }

    fn respond(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut state = self.state.lock().expect("state");
        if state.offline_paths.contains(&request.path) {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        if let Some((status, body)) = state.forced_status.get(&request.path) {
            return Ok(HttpResponse::new(*status, body.clone()));
        }

        let body = request.body.clone().unwrap_or(serde_json::Value::Null);
        let is_post = request.method == Method::POST;
        match request.path.as_str() {
            "/auth/login" if is_post => {
                let email = body["email"].as_str().unwrap_or_default();
                let password = body["password"].as_str().unwrap_or_default();
                match state.users.get(email).cloned() {
                    Some((expected, pair)) if expected == password => {
                        state.valid_access.insert(pair.access_token.clone());
                        Ok(token_response(&pair))
                    }
                    _ => Ok(HttpResponse::new(
                        StatusCode::UNAUTHORIZED,
                        r#"{"detail":"Invalid email or password"}"#,
                    )),
                }
            }
            "/auth/refresh" if is_post => {
                let presented = body["refresh_token"].as_str().unwrap_or_default();
                match state.rotations.remove(presented) {
                    Some(next) => {
                        state.valid_access.insert(next.access_token.clone());
                        Ok(token_response(&next))
                    }
                    None => Ok(HttpResponse::new(
                        StatusCode::UNAUTHORIZED,
                        r#"{"detail":"Invalid refresh token"}"#,
                    )),
                }
            }
            "/auth/signup" if is_post => Ok(HttpResponse::new(
                StatusCode::CREATED,
                serde_json::json!({
                    "id": "u-100",
                    "email": body["email"],
                    "name": body["name"],
                })
                .to_string(),
            )),
            path => {
                let authorized = request
                    .bearer
                    .as_ref()
                    .map(|t| state.valid_access.contains(t))
                    .unwrap_or(false);
                if !authorized {
                    return Ok(HttpResponse::new(
                        StatusCode::UNAUTHORIZED,
                        r#"{"detail":"Token expired"}"#,
                    ));
                }
                Ok(match path {
                    "/api/me" => HttpResponse::new(
                        StatusCode::OK,
                        r#"{"id":7,"email":"a@b.com","name":"Ada"}"#,
                    ),
                    "/steps/add" => HttpResponse::new(
                        StatusCode::OK,
                        r#"{"success":true,"message":"Steps logged"}"#,
                    ),
                    p if p.starts_with("/steps/week") => HttpResponse::new(
                        StatusCode::OK,
                        r#"{"anchor_start":"2026-10-12","period_start":"2026-10-12","period_end":"2026-10-18","goal_daily_target":8000,"goal_period_target":56000,"week_total_steps":12000,"progress_pct":21.4,"remaining_steps":44000,"days":[{"day":"2026-10-12","total_steps":12000}]}"#,
                    ),
                    "/empty" => HttpResponse::new(StatusCode::NO_CONTENT, ""),
                    _ => HttpResponse::new(StatusCode::NOT_FOUND, r#"{"detail":"Not found"}"#),
                })
            }
        }
    }
}

fn token_response(pair: &CredentialPair) -> HttpResponse {
    HttpResponse::new(
        StatusCode::OK,
        serde_json::json!({
            "access_token": pair.access_token,
            "refresh_token": pair.refresh_token,
            "token_type": "bearer",
        })
        .to_string(),
    )
}

impl Transport for MockBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().expect("requests").push(request.clone());
        if request.path == "/auth/refresh" {
            let delay = self.state.lock().expect("state").refresh_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
        self.respond(&request)
    }
}

/// Navigator that records redirects instead of performing them.
pub(crate) struct RecordingNavigator {
    route: Mutex<String>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(route: &str) -> Self {
        Self {
            route: Mutex::new(route.to_string()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().expect("redirects").clone()
    }
}

impl crate::auth::Navigator for RecordingNavigator {
    fn current_route(&self) -> String {
        self.route.lock().expect("route").clone()
    }

    fn redirect(&self, route: &str) {
        self.redirects.lock().expect("redirects").push(route.to_string());
        *self.route.lock().expect("route") = route.to_string();
    }
}
