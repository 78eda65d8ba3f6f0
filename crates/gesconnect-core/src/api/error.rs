use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the session lifecycle and the API calls it wraps.
///
/// `Clone` so a single coalesced refresh outcome can be handed to every
/// caller that waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Not authenticated - please log in again")]
    Unauthenticated,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Request failed with status {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build an error from a non-success response.
    ///
    /// The backend reports failures as `{"detail": ...}` or
    /// `{"message": ...}`; anything else is passed through as text.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::Http {
            status,
            message: Self::truncate_body(&extract_message(body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    "Request failed".to_string()
                } else {
                    body.to_string()
                }
            })),
        }
    }

    /// Like [`from_status`](Self::from_status), but a body without a
    /// `detail` or `message` yields `fallback` instead of raw text. Used
    /// where the message is shown to a user, e.g. "Login failed".
    pub fn from_status_or(status: StatusCode, body: &str, fallback: &str) -> Self {
        ApiError::Http {
            status,
            message: Self::truncate_body(
                &extract_message(body).unwrap_or_else(|| fallback.to_string()),
            ),
        }
    }

    /// True for failures that can only be resolved by logging in again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::Unauthenticated | ApiError::NoRefreshToken => true,
            ApiError::Http { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

/// Pull a human-readable message out of a JSON error body.
pub(crate) fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message"].iter().find_map(|field| match value.get(field)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}
