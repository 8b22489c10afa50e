//! Shared constants and invariants

/// Subtracted from every upstream-reported token lifetime.
pub const TOKEN_EXPIRY_MARGIN_MS: i64 = 60_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

// One-time bootstrap seed, read only when the token file is absent
pub const ENV_REFRESH_TOKEN: &str = "REFRESH_TOKEN";
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const ENV_EXPIRES_AT: &str = "EXPIRES_AT";

pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const OAUTH_STATE_MAX_AGE_SECS: u64 = 600;
pub const API_KEY_HEADER: &str = "x-api-key";

// Supported grant types
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
