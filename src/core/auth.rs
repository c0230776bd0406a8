//! Authentication contexts for private WebSocket sessions

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::{Result, VenueError};

type HmacSha256 = Hmac<Sha256>;

/// Builds the login parameters for a private session
///
/// Consulted only while a private session connects.
pub trait AuthContext: Send + Sync {
    /// Login params for the frame carrying `correlation_id`
    fn login_params(&self, correlation_id: u64) -> Value;
}

/// HS256 login: the correlation id doubles as the signed nonce
#[derive(Clone)]
pub struct HmacAuth {
    api_key: String,
    mac: HmacSha256,
}

impl HmacAuth {
    pub fn new(api_key: impl Into<String>, secret: &str) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| VenueError::Config(format!("invalid API secret: {}", e)))?;
        Ok(Self {
            api_key: api_key.into(),
            mac,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Hex HMAC-SHA256 of `payload`
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for HmacAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacAuth")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl AuthContext for HmacAuth {
    fn login_params(&self, correlation_id: u64) -> Value {
        let nonce = correlation_id.to_string();
        let signature = self.sign(&nonce);
        json!({
            "algo": "HS256",
            "pKey": self.api_key,
            "nonce": nonce,
            "signature": signature,
        })
    }
}
