//! REST error type and venue error normalization

use serde_json::{json, Value};
use thiserror::Error;

/// REST call failure surfaced to the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The venue answered with an `error`/`errors` document; never retried
    #[error("Venue error: {body}")]
    Venue { body: Value, status: Option<u16> },

    /// Every attempt was recoverable-failed
    #[error("Request failed after {attempts} attempts (status {status:?}): {errors}")]
    Exhausted {
        attempts: u32,
        errors: Value,
        status: Option<u16>,
    },

    /// Malformed call, e.g. an endpoint that does not form a valid URL
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Error document `{errors, status}` for the caller
    pub fn payload(&self) -> Value {
        match self {
            ApiError::Venue { body, status } => {
                let errors = body.get("errors").cloned().unwrap_or(Value::Null);
                json!({ "errors": errors, "status": status })
            }
            ApiError::Exhausted { errors, status, .. } => {
                json!({ "errors": errors, "status": status })
            }
            ApiError::InvalidRequest(msg) => json!({ "errors": msg, "status": Value::Null }),
        }
    }

    /// HTTP status of the last response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Venue { status, .. } | ApiError::Exhausted { status, .. } => *status,
            ApiError::InvalidRequest(_) => None,
        }
    }

    #[inline]
    pub fn is_venue_error(&self) -> bool {
        matches!(self, ApiError::Venue { .. })
    }
}

/// Ensure a venue error document carries `errors`, copying a singular
/// `error` when the plural is absent
pub fn normalize_errors(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        if !map.contains_key("errors") {
            if let Some(error) = map.get("error").cloned() {
                map.insert("errors".to_string(), error);
            }
        }
    }
    body
}
