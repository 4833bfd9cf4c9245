//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details (application/problem+json)
///
/// The ride API reports rejected mutations this way; `detail` carries the
/// message shown to the user verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type", default = "about_blank")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn about_blank() -> String {
    "about:blank".to_string()
}

impl ProblemDetails {
    pub fn new(status: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: about_blank(),
            title: title.into(),
            status,
            detail: Some(detail.into()),
        }
    }

    pub fn to_body(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.title.clone())
    }
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`, then to a bare `message` field.
pub fn try_problem_detail(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ProblemDetails>(body) {
        if let Some(detail) = parsed.detail {
            if !detail.trim().is_empty() {
                return Some(detail);
            }
        }
        if !parsed.title.trim().is_empty() {
            return Some(parsed.title);
        }
    }

    #[derive(Deserialize)]
    struct MessageBody {
        message: String,
    }
    serde_json::from_str::<MessageBody>(body)
        .ok()
        .map(|m| m.message)
        .filter(|m| !m.trim().is_empty())
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// The resource does not exist. For the active-ride query this means
    /// "no active ride", which is a valid state rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Http { status: 404 | 410, .. })
    }

    /// Whether offering the user a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ApiError::Deserialize(_) => false,
        }
    }

    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, status } => try_problem_detail(body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("Request failed ({})", status)
                } else {
                    body.clone()
                }
            }),
            ApiError::Network(_) => "Network error, please check your connection".to_string(),
            ApiError::Deserialize(_) => "Unexpected response from server".to_string(),
        }
    }
}
