use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::{middleware, Router};
use tokio::signal::unix::{signal, SignalKind};
use tokio::select;
use tracing::info;

use crate::config::service::ServiceConfig;
use crate::executor::CallExecutor;
use crate::oauth::client::OAuthClient;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::server::{api_key, api_routes, auth_routes};
use crate::token::manager::TokenManager;
use crate::token::store::{FileTokenStore, TokenStoreKind};

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<CallExecutor>,
    pub api_key: Arc<str>,
    /// `Secure` attribute on the OAuth state cookie.
    pub secure_cookies: bool,
    pub metrics_state: MetricsState,
}

impl AppState {
    pub fn new(executor: Arc<CallExecutor>, api_key: &str, secure_cookies: bool, metrics: &Metrics) -> Self {
        Self {
            executor,
            api_key: Arc::from(api_key),
            secure_cookies,
            metrics_state: MetricsState::new(metrics.registry.clone()),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        self.executor.tokens()
    }
}

/// Wires the token manager and executor from config, loading the persisted record.
pub async fn build_state(config: &ServiceConfig) -> Result<AppState> {
    let oauth = OAuthClient::new(config.oauth.clone())?;
    let store = TokenStoreKind::File(FileTokenStore::new(&config.token_store.path));
    let tokens = Arc::new(TokenManager::load(store, oauth).await);

    let executor = CallExecutor::new(
        tokens,
        config.upstream.base_url.clone(),
        Duration::from_millis(config.upstream.timeout_ms),
    )?;

    let secure_cookies = config.oauth.redirect_uri.starts_with("https://");
    Ok(AppState::new(Arc::new(executor), &config.api_key, secure_cookies, get_metrics().await))
}

/// Public login/status routes, key-guarded `/api` routes and optional metrics.
pub fn router(state: AppState, config: &ServiceConfig) -> Router {
    let api = api_routes::router()
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key::require_api_key));

    Router::new()
        .merge(auth_routes::router())
        .merge(api)
        .merge(state.metrics_state.router(&config.settings.metrics))
        .with_state(state)
}

/// Serve until SIGINT/SIGTERM.
pub async fn start(config: &ServiceConfig) -> Result<()> {
    let state = build_state(config).await?;
    let app = router(state, config);

    let bind_addr = format!("{}:{}", config.settings.server.host, config.settings.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow!("cannot bind {}: {}", bind_addr, e))?;
    info!("listening on {}", bind_addr);

    let metrics = get_metrics().await;
    metrics.up.set(1);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    metrics.up.set(0);
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let (Ok(mut sigint), Ok(mut sigterm)) =
        (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
    else {
        // without signal handlers the server simply runs until killed
        return std::future::pending::<()>().await;
    };
    select! {
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown..."),
        _ = sigterm.recv() => info!("Received SIGTERM. Initiating graceful shutdown..."),
    }
}
