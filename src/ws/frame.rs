//! Outbound frame and reply matching

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"id": int, "method": str, "params": doc}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl OutboundFrame {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    #[inline]
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Method name for a channel subscription, e.g. `subscribeTrades`
#[inline]
pub fn subscribe_method(channel: &str) -> String {
    format!("subscribe{}", channel)
}

#[inline]
pub fn unsubscribe_method(channel: &str) -> String {
    format!("unsubscribe{}", channel)
}

/// Correlation id echoed by a reply frame
pub fn reply_id(doc: &Value) -> Option<u64> {
    match doc.get("id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
