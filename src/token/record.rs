use serde::{Deserialize, Serialize};

use crate::helpers::time::{expires_at_millis, now_millis};
use crate::oauth::client::TokenResponse;

/// The one persisted credential set of the process.
///
/// A never-authenticated gateway holds `TokenRecord::default()`: no tokens and
/// `expires_at == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Epoch milliseconds, already pulled forward by the safety margin.
    #[serde(default)]
    pub expires_at: i64,
}

impl TokenRecord {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>, expires_at: i64) -> Self {
        Self { access_token, refresh_token, expires_at }
    }

    /// Access token present and not past its margined expiry.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(now_millis())
    }

    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        self.access_token.is_some() && self.expires_at > now_ms
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// Applies a token-endpoint response. Present fields overwrite, absent
    /// ones keep their previous value, so a refresh that does not rotate the
    /// refresh token never loses it.
    pub fn merge(&mut self, response: &TokenResponse, started_at_ms: i64) {
        if let Some(access_token) = &response.access_token {
            self.access_token = Some(access_token.clone());
        }
        if let Some(refresh_token) = &response.refresh_token {
            self.refresh_token = Some(refresh_token.clone());
        }
        if let Some(expires_in) = response.expires_in {
            self.expires_at = expires_at_millis(started_at_ms, expires_in);
        }
    }
}

/// First characters of a secret, for logs.
pub fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{}…", visible)
}
