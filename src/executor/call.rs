use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::ApiError;
use crate::executor::request::RequestDescriptor;
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::token::manager::TokenManager;
use crate::token::store::{TokenStore, TokenStoreKind};

static TIMEOUT_MSG: &str = "timeout";
static ERROR_MSG: &str = "error";

/// Position in the retry-on-401 machine. A call starts `Initial`; a 401 there
/// triggers one reactive refresh and moves it to `Retried`, where a second
/// 401 ends the call with `AuthExpired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    Initial,
    Retried,
}

/// What the upstream said, reduced to what the machine branches on.
#[derive(Debug)]
enum Reply {
    Success(String),
    Unauthorized,
    Rejected { status: u16, body: String },
}

/// Attaches a valid bearer token to every upstream request and retries once
/// on 401.
pub struct CallExecutor<S = TokenStoreKind> {
    tokens: Arc<TokenManager<S>>,
    client: Client,
    base_url: String,
}

impl<S: TokenStore> CallExecutor<S> {
    pub fn new(tokens: Arc<TokenManager<S>>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { tokens, client, base_url: base_url.into() })
    }

    pub fn tokens(&self) -> &Arc<TokenManager<S>> {
        &self.tokens
    }

    /// Succeeds, or fails with a classified error after at most one reactive
    /// refresh on top of any proactive one.
    pub async fn call(&self, request: &RequestDescriptor) -> Result<Value, ApiError> {
        self.prepare().await?;

        let mut stage = CallStage::Initial;
        loop {
            let token = self.tokens.access_token().await.ok_or(ApiError::Unauthenticated)?;
            let reply = self.send(request, &token).await?;

            stage = match (stage, reply) {
                (_, Reply::Success(body)) => return parse_body(&body),
                (_, Reply::Rejected { status, body }) => return Err(ApiError::Upstream { status, body }),
                (CallStage::Initial, Reply::Unauthorized) => {
                    self.reactive_refresh(&token).await?;
                    CallStage::Retried
                }
                (CallStage::Retried, Reply::Unauthorized) => {
                    warn!("{} {} still unauthorized after refresh", request.method, request.path);
                    return Err(ApiError::AuthExpired);
                }
            };
            debug!("retrying {} {} with refreshed token", request.method, request.path);
        }
    }

    /// Proactive refresh, then the no-credential fast path. Never touches
    /// the upstream.
    async fn prepare(&self) -> Result<(), ApiError> {
        if !self.tokens.is_fresh().await && self.tokens.has_refresh_token().await {
            self.tokens.ensure_fresh().await.map_err(|e| {
                warn!("proactive refresh failed: {}", e);
                ApiError::Unauthenticated
            })?;
        }
        if self.tokens.access_token().await.is_none() {
            return Err(ApiError::Unauthenticated);
        }
        Ok(())
    }

    async fn reactive_refresh(&self, rejected_token: &str) -> Result<(), ApiError> {
        if !self.tokens.has_refresh_token().await {
            info!("upstream rejected access token and no refresh token is held");
            return Err(ApiError::AuthExpired);
        }
        self.tokens.refresh_rejected(rejected_token).await.map_err(|e| {
            warn!("reactive refresh failed: {}", e);
            ApiError::AuthExpired
        })
    }

    async fn send(&self, request: &RequestDescriptor, token: &str) -> Result<Reply, ApiError> {
        let metrics = get_metrics().await;
        let start = get_instant();
        let url = request.url(&self.base_url);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone())
            .bearer_auth(token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let result = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;
        metrics.upstream_duration.observe(start.elapsed().as_secs_f64());

        let (status, body) = result.map_err(|e| {
            if e.is_timeout() {
                metrics.upstream_requests.with_label_values(&[TIMEOUT_MSG]).inc();
                warn!("{} {} timed out", request.method, request.path);
                ApiError::UpstreamTimeout
            } else {
                metrics.upstream_requests.with_label_values(&[ERROR_MSG]).inc();
                warn!("{} {} failed: {}", request.method, request.path, e);
                ApiError::UpstreamTransport(e.to_string())
            }
        })?;

        metrics.upstream_requests.with_label_values(&[status_class(status)]).inc();
        debug!("{} {} -> {}", request.method, request.path, status);

        Ok(if status.is_success() {
            Reply::Success(body)
        } else if status == StatusCode::UNAUTHORIZED {
            Reply::Unauthorized
        } else {
            Reply::Rejected { status: status.as_u16(), body }
        })
    }
}

fn parse_body(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
