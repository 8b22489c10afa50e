// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::post;
use axum::Json;
use reqwest::Client;
use serde_json::Value;

use crate::config::service::{OAuthConfig, ServiceConfig, TokenStoreConfig, UpstreamConfig};
use crate::config::settings::{LogFormat, LoggingConfig, MetricsConfig, ServerConfig, SettingsConfig};

pub const TOKEN_PATH: &str = "/oauth2/v3/token";
pub const API_KEY: &str = "local-test-key";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("reqwest client")
}

pub fn oauth_config(base_url: &str) -> OAuthConfig {
    let base = base_url.trim_end_matches('/');
    OAuthConfig {
        client_id: "client-abc".to_string(),
        client_secret: "secret-xyz".to_string(),
        authorize_url: format!("{}/oauth2/v3/authorize", base),
        token_url: format!("{}{}", base, TOKEN_PATH),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        scopes: vec![
            "openid".to_string(),
            "offline_access".to_string(),
            "vehicle_device_data".to_string(),
        ],
        audience: None,
        extra_authorize_params: BTreeMap::from([("locale".to_string(), "en-US".to_string())]),
        timeout_ms: 2000,
    }
}

pub fn service_config(auth_base_url: &str, upstream_base_url: &str, store_path: &str) -> ServiceConfig {
    ServiceConfig {
        settings: SettingsConfig {
            metrics: MetricsConfig { path: "/metrics".to_string(), is_enabled: true },
            server: ServerConfig { host: "127.0.0.1".to_string(), port: "0".to_string() },
            logging: Some(LoggingConfig::new("info".to_string(), LogFormat::Compact)),
        },
        oauth: oauth_config(auth_base_url),
        upstream: UpstreamConfig { base_url: upstream_base_url.to_string(), timeout_ms: 2000 },
        token_store: TokenStoreConfig { path: store_path.to_string() },
        api_key: API_KEY.to_string(),
    }
}

/// ================================
/// Mock authorization server
/// ================================
pub struct MockTokenEndpoint {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    /// Raw form bodies, in arrival order.
    pub forms: Arc<Mutex<Vec<String>>>,
}

impl MockTokenEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn forms(&self) -> Vec<String> {
        self.forms.lock().unwrap().clone()
    }
}

/// Every request to the token path answers `status` + `body` after `delay`.
pub async fn spawn_token_endpoint(status: StatusCode, body: Value, delay: Duration) -> MockTokenEndpoint {
    let hits = Arc::new(AtomicUsize::new(0));
    let forms = Arc::new(Mutex::new(Vec::new()));

    let router = Router::new().route(TOKEN_PATH, post({
        let hits = hits.clone();
        let forms = forms.clone();
        move |form: String| {
            let hits = hits.clone();
            let forms = forms.clone();
            let body = body.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                forms.lock().unwrap().push(form);
                tokio::time::sleep(delay).await;
                (status, Json(body))
            }
        }
    }));
    let (_handle, addr) = spawn_axum(router).await;
    MockTokenEndpoint { addr, hits, forms }
}

/// ================================
/// Mock vehicle API
/// ================================
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub authorization: Option<String>,
    pub body: String,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub enum UpstreamBehavior {
    /// n-th request gets the n-th entry; the last entry repeats.
    Script(Arc<Vec<(StatusCode, Value)>>),
    /// 200 with `body` for `Bearer <token>`, 401 otherwise.
    AcceptToken { token: String, body: Value },
}

impl UpstreamBehavior {
    pub fn script(steps: Vec<(StatusCode, Value)>) -> Self {
        UpstreamBehavior::Script(Arc::new(steps))
    }

    fn reply(&self, n: usize, authorization: Option<&str>) -> (StatusCode, Value) {
        match self {
            UpstreamBehavior::Script(steps) => steps
                .get(n)
                .or(steps.last())
                .cloned()
                .unwrap_or((StatusCode::OK, Value::Null)),
            UpstreamBehavior::AcceptToken { token, body } => {
                if authorization == Some(format!("Bearer {}", token).as_str()) {
                    (StatusCode::OK, body.clone())
                } else {
                    (StatusCode::UNAUTHORIZED, json!({"error": "invalid bearer token"}))
                }
            }
        }
    }
}

/// Answers any method and path according to `behavior` after `delay`.
pub async fn spawn_upstream(behavior: UpstreamBehavior, delay: Duration) -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let router = Router::new().fallback({
        let hits = hits.clone();
        let requests = requests.clone();
        move |method: Method, uri: Uri, headers: HeaderMap, body: String| {
            let hits = hits.clone();
            let requests = requests.clone();
            let behavior = behavior.clone();
            async move {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let authorization = headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let reply = behavior.reply(n, authorization.as_deref());
                requests.lock().unwrap().push(RecordedRequest { method, uri, authorization, body });
                tokio::time::sleep(delay).await;
                (reply.0, Json(reply.1))
            }
        }
    });
    let (_handle, addr) = spawn_axum(router).await;
    MockUpstream { addr, hits, requests }
}
