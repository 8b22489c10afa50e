// Full router over HTTP:
//  - /api routes demand the API key and unwrap the upstream envelope
//  - /login hands out a state cookie and redirects to the authorization server
//  - /callback checks the state before exchanging the code
//  - /status and /metrics

#[cfg(test)]
mod test {

use std::{collections::HashMap, net::SocketAddr, sync::{atomic::Ordering, Arc}, time::Duration};

use axum::http::StatusCode;
use reqwest::header::{LOCATION, SET_COOKIE};
use serde_json::{json, Value};
use url::Url;

use crate::executor::CallExecutor;
use crate::helpers::time::now_millis;
use crate::observability::metrics::get_metrics;
use crate::oauth::client::OAuthClient;
use crate::server::server::{router, AppState};
use crate::tests::common::{
    build_reqwest_client, service_config, spawn_axum, spawn_token_endpoint, spawn_upstream, JoinHandle,
    UpstreamBehavior, API_KEY,
};
use crate::token::{
    manager::TokenManager,
    record::TokenRecord,
    store::{MemoryTokenStore, TokenStoreKind},
};

async fn spawn_gateway(record: TokenRecord, auth_base_url: &str, upstream_base_url: &str) -> (JoinHandle<()>, SocketAddr) {
    let config = service_config(auth_base_url, upstream_base_url, "/unused/tokens.json");
    let oauth = OAuthClient::new(config.oauth.clone()).expect("client");
    let store = TokenStoreKind::Memory(MemoryTokenStore::new(record.clone()));
    let tokens = Arc::new(TokenManager::new(record, store, oauth));
    let executor = CallExecutor::new(tokens, upstream_base_url, Duration::from_secs(2)).expect("executor");
    let state = AppState::new(Arc::new(executor), &config.api_key, false, get_metrics().await);
    spawn_axum(router(state, &config)).await
}

fn fresh() -> TokenRecord {
    TokenRecord::new(Some("at-1".into()), Some("rt-1".into()), now_millis() + 3_600_000)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_routes_require_the_key() {
    let upstream = spawn_upstream(
        UpstreamBehavior::script(vec![(StatusCode::OK, json!({"response": [{"id": 7}], "count": 1}))]),
        Duration::ZERO,
    )
    .await;
    let (_h, addr) = spawn_gateway(fresh(), "http://127.0.0.1:1", &upstream.base_url()).await;
    let client = build_reqwest_client();
    let url = format!("http://{}/api/vehicles", addr);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client.get(&url).header("x-api-key", "wrong").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);

    let resp = client.get(&url).header("x-api-key", API_KEY).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!([{"id": 7}]));

    let resp = client.get(&url).bearer_auth(API_KEY).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
    assert_eq!(upstream.requests()[0].uri.path(), "/api/1/vehicles");
    // the API key never leaks upstream
    assert_eq!(upstream.requests()[1].authorization.as_deref(), Some("Bearer at-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unauthenticated_api_call_asks_for_login() {
    let upstream = spawn_upstream(UpstreamBehavior::script(vec![(StatusCode::OK, json!({}))]), Duration::ZERO).await;
    let (_h, addr) = spawn_gateway(TokenRecord::default(), "http://127.0.0.1:1", &upstream.base_url()).await;
    let client = build_reqwest_client();

    let resp = client
        .get(format!("http://{}/api/vehicles/7/vehicle_data", addr))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reauthenticate"], json!(true));
    assert_eq!(body["login"], json!("/login"));
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn command_with_invalid_json_is_rejected_locally() {
    let upstream = spawn_upstream(UpstreamBehavior::script(vec![(StatusCode::OK, json!({}))]), Duration::ZERO).await;
    let (_h, addr) = spawn_gateway(fresh(), "http://127.0.0.1:1", &upstream.base_url()).await;

    let resp = build_reqwest_client()
        .post(format!("http://{}/api/vehicles/7/command/honk_horn", addr))
        .header("x-api-key", API_KEY)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encoded_traversal_in_path_never_reaches_upstream() {
    let upstream = spawn_upstream(UpstreamBehavior::script(vec![(StatusCode::OK, json!({}))]), Duration::ZERO).await;
    let (_h, addr) = spawn_gateway(fresh(), "http://127.0.0.1:1", &upstream.base_url()).await;
    let client = build_reqwest_client();

    for path in [
        "/api/vehicles/..%2F..%2Fusers%2Fme/wake_up",
        "/api/vehicles/7/command/..%2F..%2F..%2Fusers%2Fme",
    ] {
        let resp = client
            .post(format!("http://{}{}", addr, path))
            .header("x-api-key", API_KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", path);
    }

    let resp = client
        .get(format!("http://{}/api/vehicles/..%2F..%2Foauth2/vehicle_data", addr))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_sets_state_cookie_and_redirects() {
    let (_h, addr) = spawn_gateway(TokenRecord::default(), "http://127.0.0.1:1", "http://127.0.0.1:1").await;

    let resp = build_reqwest_client().get(format!("http://{}/login", addr)).send().await.unwrap();
    assert!(resp.status().is_redirection());

    let cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_owned();
    let state = cookie
        .strip_prefix("oauth_state=")
        .and_then(|rest| rest.split(';').next())
        .unwrap()
        .to_owned();
    assert_eq!(state.len(), 43);
    assert!(cookie.contains("HttpOnly"));

    let location = Url::parse(resp.headers().get(LOCATION).unwrap().to_str().unwrap()).unwrap();
    assert_eq!(location.path(), "/oauth2/v3/authorize");
    let params: HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert_eq!(params["state"], state);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "client-abc");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_with_mismatched_state_is_rejected() {
    let auth = spawn_token_endpoint(StatusCode::OK, json!({"access_token": "at"}), Duration::ZERO).await;
    let (_h, addr) = spawn_gateway(TokenRecord::default(), &auth.base_url(), "http://127.0.0.1:1").await;
    let client = build_reqwest_client();

    let resp = client
        .get(format!("http://{}/callback?code=abc&state=forged", addr))
        .header("cookie", "oauth_state=expected")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .get(format!("http://{}/callback?code=abc&state=forged", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(auth.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_exchanges_code_and_authenticates() {
    let auth = spawn_token_endpoint(
        StatusCode::OK,
        json!({"access_token": "at-new", "refresh_token": "rt-new", "expires_in": 28800}),
        Duration::ZERO,
    )
    .await;
    let (_h, addr) = spawn_gateway(TokenRecord::default(), &auth.base_url(), "http://127.0.0.1:1").await;
    let client = build_reqwest_client();

    let status: Value = client.get(format!("http://{}/status", addr)).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["authenticated"], json!(false));

    let resp = client
        .get(format!("http://{}/callback?code=code-123&state=s1", addr))
        .header("cookie", "oauth_state=s1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cleared = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_owned();
    assert!(cleared.contains("Max-Age=0"));

    let forms = auth.forms();
    assert_eq!(forms.len(), 1);
    assert!(forms[0].contains("grant_type=authorization_code"));
    assert!(forms[0].contains("code=code-123"));

    let status: Value = client.get(format!("http://{}/status", addr)).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["authenticated"], json!(true));
    assert_eq!(status["fresh"], json!(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_exchange_is_bad_gateway() {
    let auth = spawn_token_endpoint(StatusCode::BAD_REQUEST, json!({"error": "invalid_grant"}), Duration::ZERO).await;
    let (_h, addr) = spawn_gateway(TokenRecord::default(), &auth.base_url(), "http://127.0.0.1:1").await;
    let client = build_reqwest_client();

    let resp = client
        .get(format!("http://{}/callback?code=used&state=s1", addr))
        .header("cookie", "oauth_state=s1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], json!(400));

    let status: Value = client.get(format!("http://{}/status", addr)).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["authenticated"], json!(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_error_param_is_bad_request() {
    let (_h, addr) = spawn_gateway(TokenRecord::default(), "http://127.0.0.1:1", "http://127.0.0.1:1").await;

    let resp = build_reqwest_client()
        .get(format!("http://{}/callback?error=access_denied&state=s1", addr))
        .header("cookie", "oauth_state=s1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_and_metrics_are_public() {
    let (_h, addr) = spawn_gateway(TokenRecord::default(), "http://127.0.0.1:1", "http://127.0.0.1:1").await;
    let client = build_reqwest_client();

    let resp = client.get(format!("http://{}/health", addr)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.get(format!("http://{}/metrics", addr)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = resp.text().await.unwrap();
    assert!(text.contains("vehiclegateway_"));
}

}
