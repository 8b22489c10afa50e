//! Static API key check in front of every `/api` route.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::observability::metrics::get_metrics;
use crate::server::server::AppState;
use crate::utils::constants::API_KEY_HEADER;

/// Accepts `x-api-key: <key>` or `Authorization: Bearer <key>`.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = presented_key(request.headers());
    let key_present = presented.is_some();
    if presented.is_some_and(|key| key_matches(key, &state.api_key)) {
        return next.run(request).await;
    }

    get_metrics().await.api_key_rejections.inc();
    warn!(path = %request.uri().path(), key_present, "rejected api request");
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({"error": "missing or invalid api key"})),
    )
        .into_response()
}

/// Constant-time in the key contents; only the length can leak.
fn key_matches(presented: &str, expected: &str) -> bool {
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        })
        .map(str::trim)
}
