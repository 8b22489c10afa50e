use chrono::Utc;
use tokio::time::Instant;

use crate::utils::constants::TOKEN_EXPIRY_MARGIN_MS;

/// Epoch milliseconds; every `expires_at` in the crate uses this unit.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Absolute expiry for a token issued with `expires_in_secs`, measured from
/// the moment the token request started and pulled forward by the margin.
pub fn expires_at_millis(started_at_ms: i64, expires_in_secs: u64) -> i64 {
    let lifetime_ms = i64::try_from(expires_in_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    started_at_ms
        .saturating_add(lifetime_ms)
        .saturating_sub(TOKEN_EXPIRY_MARGIN_MS)
}

pub fn get_instant() -> Instant {
    Instant::now()
}
