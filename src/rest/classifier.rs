//! Response classification
//!
//! Turns one transport attempt into a verdict the executor acts on:
//! success, recoverable failure (retry) or venue-reported error (raise now).
//! Pure functions only.

use serde_json::Value;

use crate::rest::transport::{RawResponse, TransportError};

/// Statuses that count as success
pub const ACCEPTED_STATUSES: [u16; 2] = [200, 201];

/// Raw text bodies longer than this are truncated
pub const MAX_TEXT_LEN: usize = 100;

/// Marker fields of a venue-reported error
pub const ERROR_MARKERS: [&str; 2] = ["error", "errors"];

/// Parsed body of one response
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Decoded JSON document
    Document(Value),
    /// Bounded text surrogate of a body that is not JSON
    Text(String),
}

/// What the executor should do with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Transport or decoding failure, or an unexpected status: retry
    Recoverable,
    /// Well-formed error payload from the venue: raise without retry
    VenueError,
}

/// Normalized verdict plus parsed body for one transport attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedResponse {
    pub status: Option<u16>,
    pub body: Option<Body>,
    /// Reason phrase, or the transport failure description
    pub reason: Option<String>,
    pub verdict: Verdict,
}

impl ClassifiedResponse {
    #[inline]
    pub fn is_error(&self) -> bool {
        self.verdict != Verdict::Success
    }

    /// Message exposed for this response: the body if one was obtained,
    /// otherwise the reason phrase
    pub fn payload(&self) -> Value {
        match &self.body {
            Some(Body::Document(doc)) => doc.clone(),
            Some(Body::Text(text)) => Value::String(text.clone()),
            None => self
                .reason
                .as_ref()
                .map(|r| Value::String(r.clone()))
                .unwrap_or(Value::Null),
        }
    }

    /// Payload rendered for log lines
    pub fn message(&self) -> String {
        match self.payload() {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// Classify the outcome of one transport attempt
pub fn classify(outcome: Result<RawResponse, TransportError>) -> ClassifiedResponse {
    match outcome {
        Ok(response) => classify_response(&response),
        Err(e) => ClassifiedResponse {
            status: None,
            body: None,
            reason: Some(e.to_string()),
            verdict: Verdict::Recoverable,
        },
    }
}

/// Classify a response that reached us
pub fn classify_response(response: &RawResponse) -> ClassifiedResponse {
    let (body, _) = parse_body(&response.body);
    let accepted = ACCEPTED_STATUSES.contains(&response.status);

    let verdict = match &body {
        Some(Body::Document(doc)) if has_error_marker(doc) => Verdict::VenueError,
        Some(Body::Document(_)) if accepted => Verdict::Success,
        _ => Verdict::Recoverable,
    };

    ClassifiedResponse {
        status: Some(response.status),
        body,
        reason: response.reason.clone(),
        verdict,
    }
}

/// Decode a body; the flag is false when the bytes were not a JSON document
///
/// Bytes that fail strict decoding get a second chance as lossy UTF-8 text,
/// so a document with a stray invalid byte in a string is still recovered.
/// A literal `null` decodes but carries no content.
pub fn parse_body(raw: &[u8]) -> (Option<Body>, bool) {
    if let Ok(doc) = serde_json::from_slice::<Value>(raw) {
        return (document(doc), true);
    }

    let text = String::from_utf8_lossy(raw);
    if let Ok(doc) = serde_json::from_str::<Value>(&text) {
        return (document(doc), true);
    }

    (truncate_text(&text).map(Body::Text), false)
}

fn document(doc: Value) -> Option<Body> {
    match doc {
        Value::Null => None,
        doc => Some(Body::Document(doc)),
    }
}

/// Bound a text body for logs and errors; empty text is no content
pub fn truncate_text(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    match text.char_indices().nth(MAX_TEXT_LEN) {
        Some((cut, _)) => Some(format!("{} ... (truncated)", &text[..cut])),
        None => Some(text.to_string()),
    }
}

/// Document carries an `error` or `errors` field
#[inline]
pub fn has_error_marker(doc: &Value) -> bool {
    doc.as_object()
        .map(|obj| ERROR_MARKERS.iter().any(|m| obj.contains_key(*m)))
        .unwrap_or(false)
}
