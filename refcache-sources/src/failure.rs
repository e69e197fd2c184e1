//! Typed upstream failures.
//!
//! Every failure is classified into an [`ErrorKind`] from the HTTP status
//! code or the `reqwest::Error` predicates. Message text is only carried for
//! humans and logs; nothing branches on it.

use refcache_core::{truncate_chars, ErrorKind};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Longest raw error body kept in a failure message.
const MAX_BODY_CHARS: usize = 200;

/// JSON fields that upstream error bodies use for their message, in preference order.
const MESSAGE_FIELDS: &[&str] = &[
    "message",
    "error",
    "mensaje",
    "detalle",
    "descripcion",
    "errorMessage",
];

/// A failed call to an upstream source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SourceFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out(source_name: &str, after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("{} did not respond within {}ms", source_name, after.as_millis()),
        )
    }

    pub fn rate_limited(source_name: &str) -> Self {
        Self::new(
            ErrorKind::RateLimited,
            format!("{} call skipped: local rate limit reached", source_name),
        )
    }

    /// Failure for a non-success HTTP response.
    pub fn from_status(source_name: &str, status: StatusCode, body: &str) -> Self {
        let detail = extract_error_message(body);
        let message = if detail.is_empty() {
            format!("{} returned {}", source_name, status)
        } else {
            format!("{} returned {}: {}", source_name, status, detail)
        };
        Self::new(kind_for_status(status), message)
    }

    /// Failure for an error raised before a response was obtained or decoded.
    pub fn from_transport(source_name: &str, err: &reqwest::Error) -> Self {
        Self::new(
            kind_for_transport(err),
            format!("{} request failed: {}", source_name, err),
        )
    }
}

/// Map an HTTP status code to an error kind.
pub fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        s if s.is_server_error() => ErrorKind::Network,
        _ => ErrorKind::Unknown,
    }
}

/// Map a transport-level `reqwest` error to an error kind.
pub fn kind_for_transport(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::Network
    } else if let Some(status) = err.status() {
        kind_for_status(status)
    } else {
        ErrorKind::Unknown
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// JSON bodies are searched for the usual message fields, then an `errors`
/// array. Anything else is returned as trimmed text, capped in length.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed)
    {
        for field in MESSAGE_FIELDS {
            match map.get(*field) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                    return s.trim().to_string();
                }
                Some(serde_json::Value::Object(inner)) => {
                    if let Some(serde_json::Value::String(s)) = inner.get("message") {
                        return s.trim().to_string();
                    }
                }
                _ => {}
            }
        }
        if let Some(serde_json::Value::Array(errors)) = map.get("errors") {
            let joined: Vec<String> = errors
                .iter()
                .map(|e| match e {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            if !joined.is_empty() {
                return truncate_chars(&joined.join("; "), MAX_BODY_CHARS);
            }
        }
    }

    truncate_chars(trimmed, MAX_BODY_CHARS)
}
