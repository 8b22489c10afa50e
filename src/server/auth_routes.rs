//! Login redirect, OAuth callback and status: the routes that need no API key.

use axum::{
    extract::{Query, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::AuthError;
use crate::server::server::AppState;
use crate::utils::constants::{OAUTH_STATE_COOKIE, OAUTH_STATE_MAX_AGE_SECS};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/login", get(login))
        .route("/callback", get(callback))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let record = state.tokens().snapshot().await;
    Json(json!({
        "authenticated": !record.is_empty(),
        "fresh": record.is_fresh(),
        "expires_at": record.expires_at,
    }))
}

async fn login(State(state): State<AppState>) -> Response {
    match state.tokens().build_authorization_redirect() {
        Ok(redirect) => {
            info!("redirecting to authorization server");
            let cookie = state_cookie(&redirect.state, OAUTH_STATE_MAX_AGE_SECS, state.secure_cookies);
            ([(SET_COOKIE, cookie)], Redirect::to(redirect.url.as_str())).into_response()
        }
        Err(e) => {
            error!("cannot build authorization url: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "authorization url misconfigured"})))
                .into_response()
        }
    }
}

async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(err) = params.error {
        warn!("authorization server returned error '{}'", err);
        return bad_request(&format!(
            "authorization denied: {}",
            params.error_description.unwrap_or(err)
        ));
    }

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE);
    match (&params.state, &expected) {
        (Some(got), Some(want)) if got == want => {}
        _ => {
            warn!(cookie_present = expected.is_some(), "oauth state mismatch");
            return bad_request("state mismatch, restart the login flow");
        }
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return bad_request("missing authorization code");
    };

    let clear = state_cookie("", 0, state.secure_cookies);
    match state.tokens().exchange_code(&code).await {
        Ok(record) => (
            StatusCode::OK,
            [(SET_COOKIE, clear)],
            Json(json!({"authenticated": true, "expires_at": record.expires_at})),
        )
            .into_response(),
        Err(AuthError::ExchangeFailed { status, body }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "code exchange rejected", "status": status, "body": body})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn state_cookie(value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        OAUTH_STATE_COOKIE, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
        .filter(|v| !v.is_empty())
}
