use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::settings::SettingsConfig;
use crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    pub oauth: OAuthConfig,
    pub upstream: UpstreamConfig,
    pub token_store: TokenStoreConfig,
    /// Static key every `/api` caller must present.
    pub api_key: String,
}

/// ================================
/// Authorization server
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Sent with both token grants when set.
    pub audience: Option<String>,
    /// Appended verbatim to the authorization redirect (e.g. `prompt`, `locale`).
    #[serde(default)]
    pub extra_authorize_params: BTreeMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// ================================
/// Vehicle-control API
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenStoreConfig {
    pub path: String,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}
