//! Key-guarded pass-through to the vehicle API. Payloads stay opaque JSON;
//! only the upstream's `{"response": ...}` envelope is unwrapped.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::executor::RequestDescriptor;
use crate::server::server::AppState;

const UPSTREAM_PREFIX: &str = "/api/1/vehicles";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/vehicles", get(list_vehicles))
        .route("/api/vehicles/{id}", get(vehicle))
        .route("/api/vehicles/{id}/vehicle_data", get(vehicle_data))
        .route("/api/vehicles/{id}/wake_up", post(wake_up))
        .route("/api/vehicles/{id}/command/{command}", post(command))
}

async fn list_vehicles(State(state): State<AppState>) -> Response {
    forward(&state, RequestDescriptor::get(UPSTREAM_PREFIX)).await
}

async fn vehicle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Err(rejected) = check_segment(&id) {
        return rejected;
    }
    forward(&state, RequestDescriptor::get(format!("{}/{}", UPSTREAM_PREFIX, id))).await
}

async fn vehicle_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    if let Err(rejected) = check_segment(&id) {
        return rejected;
    }
    let mut request = RequestDescriptor::get(format!("{}/{}/vehicle_data", UPSTREAM_PREFIX, id));
    if let Some(query) = query {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            request = request.with_query(k, v);
        }
    }
    forward(&state, request).await
}

async fn wake_up(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Err(rejected) = check_segment(&id) {
        return rejected;
    }
    forward(&state, RequestDescriptor::post(format!("{}/{}/wake_up", UPSTREAM_PREFIX, id))).await
}

async fn command(
    State(state): State<AppState>,
    Path((id, command)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if let Err(rejected) = check_segment(&id).and_then(|_| check_segment(&command)) {
        return rejected;
    }
    let mut request = RequestDescriptor::post(format!("{}/{}/command/{}", UPSTREAM_PREFIX, id, command));
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => request = request.with_json(value),
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": format!("invalid json body: {}", e)})))
                    .into_response()
            }
        }
    }
    forward(&state, request).await
}

async fn forward(state: &AppState, request: RequestDescriptor) -> Response {
    debug!("forwarding {} {}", request.method, request.path);
    match state.executor.call(&request).await {
        Ok(value) => Json(unwrap_envelope(value)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Captures arrive percent-decoded; each must stay a single upstream path segment.
fn check_segment(segment: &str) -> Result<(), Response> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '?', '#']);
    if valid {
        return Ok(());
    }
    warn!("rejected path segment {:?}", segment);
    Err((StatusCode::BAD_REQUEST, Json(json!({"error": "invalid path segment"}))).into_response())
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("response") => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthenticated | ApiError::AuthExpired => (
                StatusCode::UNAUTHORIZED,
                json!({"error": self.to_string(), "reauthenticate": true, "login": "/login"}),
            ),
            ApiError::Upstream { status, body } => (
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                json!({"error": "upstream rejected request", "status": status, "body": body}),
            ),
            ApiError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, json!({"error": self.to_string()})),
            ApiError::UpstreamTransport(_) | ApiError::InvalidResponse(_) => {
                (StatusCode::BAD_GATEWAY, json!({"error": self.to_string()}))
            }
        };
        (status, Json(body)).into_response()
    }
}
