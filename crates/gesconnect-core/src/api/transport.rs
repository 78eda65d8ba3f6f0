//! HTTP seam between the session lifecycle and the network.
//!
//! Everything above this module deals in [`HttpRequest`] / [`HttpResponse`],
//! which keeps the retry and refresh logic testable without a server.

use std::future::Future;
use std::time::Duration;

use reqwest::{header, Client, Method, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::ApiError;

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the API base URL, including any query string.
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json_body<B: Serialize>(self, body: &B) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        Ok(self.json(value))
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Sends one request and returns whatever the server answered.
///
/// Only transport failures (DNS, connect, timeout) are errors; every HTTP
/// status, including 401, comes back as `Ok` so callers can classify it.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(header::ACCEPT, "application/json");
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(url = %url, status = %status, "Response received");

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    async fn me(headers: HeaderMap) -> (axum::http::StatusCode, String) {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer A1") => (axum::http::StatusCode::OK, r#"{"email":"a@b.com"}"#.to_string()),
            _ => (axum::http::StatusCode::UNAUTHORIZED, r#"{"detail":"expired"}"#.to_string()),
        }
    }

    async fn echo(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        Json(body)
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/api/me", get(me))
            .route("/echo", post(echo));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{}/", addr)
    }

    #[test]
    fn test_url_joining() {
        let transport = ReqwestTransport::new("https://api.example.com/socialapi/", Duration::from_secs(5))
            .expect("client");
        assert_eq!(transport.base_url(), "https://api.example.com/socialapi");
        assert_eq!(transport.url("/api/me"), "https://api.example.com/socialapi/api/me");
        assert_eq!(transport.url("steps/add"), "https://api.example.com/socialapi/steps/add");
    }

    #[tokio::test]
    async fn test_bearer_header_and_status_passthrough() {
        let base = spawn_server().await;
        let transport = ReqwestTransport::new(&base, Duration::from_secs(5)).expect("client");

        let ok = transport
            .send(HttpRequest::new(Method::GET, "/api/me").bearer("A1"))
            .await
            .expect("request succeeds");
        assert_eq!(ok.status, StatusCode::OK);
        assert!(ok.body.contains("a@b.com"));

        let expired = transport
            .send(HttpRequest::new(Method::GET, "/api/me").bearer("A0"))
            .await
            .expect("401 is not a transport error");
        assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_json_body_is_sent() {
        let base = spawn_server().await;
        let transport = ReqwestTransport::new(&base, Duration::from_secs(5)).expect("client");

        let response = transport
            .send(HttpRequest::new(Method::POST, "/echo").json(serde_json::json!({"steps": 10})))
            .await
            .expect("echo");
        assert!(response.is_success());
        let echoed: serde_json::Value = serde_json::from_str(&response.body).expect("json");
        assert_eq!(echoed["steps"], 10);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport =
            ReqwestTransport::new(&format!("http://{}", addr), Duration::from_secs(2)).expect("client");
        let err = transport
            .send(HttpRequest::new(Method::GET, "/api/me"))
            .await
            .expect_err("nothing listening");
        assert!(matches!(err, ApiError::Network(_)));
    }
}
