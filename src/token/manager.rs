use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::errors::AuthError;
use crate::helpers::time::{get_instant, now_millis};
use crate::oauth::client::{OAuthClient, TokenResponse};
use crate::observability::metrics::get_metrics;
use crate::token::record::{redact, TokenRecord};
use crate::token::store::{TokenStore, TokenStoreKind};

static OK_MSG: &str = "ok";
static ERROR_MSG: &str = "error";

/// Owns the process-wide token record.
///
/// Reads go through a `RwLock`. Every mutation (refresh or code exchange)
/// additionally holds `refresh_gate`, so at most one token-endpoint request is
/// in flight and store writes never interleave. The gate remembers the outcome
/// of the last attempt together with a generation counter: a caller that
/// queued behind an attempt takes that attempt's outcome instead of starting
/// another one.
pub struct TokenManager<S = TokenStoreKind> {
    record: RwLock<TokenRecord>,
    refresh_gate: Mutex<Option<Result<(), AuthError>>>,
    generation: AtomicU64,
    store: S,
    oauth: OAuthClient,
}

impl<S: TokenStore> TokenManager<S> {
    pub fn new(record: TokenRecord, store: S, oauth: OAuthClient) -> Self {
        Self {
            record: RwLock::new(record),
            refresh_gate: Mutex::new(None),
            generation: AtomicU64::new(0),
            store,
            oauth,
        }
    }

    /// Builds the manager from whatever the store holds.
    pub async fn load(store: S, oauth: OAuthClient) -> Self {
        let record = store.load().await;
        info!(
            "token state: access_token={}, refresh_token={}, expires_at={}",
            record.access_token.is_some(),
            record.refresh_token.is_some(),
            record.expires_at
        );
        get_metrics().await.authenticated.set(i64::from(!record.is_empty()));
        Self::new(record, store, oauth)
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn is_fresh(&self) -> bool {
        self.record.read().await.is_fresh()
    }

    /// Holds any credential at all; a stale access token with a refresh token counts.
    pub async fn is_authenticated(&self) -> bool {
        !self.record.read().await.is_empty()
    }

    pub async fn has_refresh_token(&self) -> bool {
        self.record.read().await.has_refresh_token()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.record.read().await.access_token.clone()
    }

    pub async fn snapshot(&self) -> TokenRecord {
        self.record.read().await.clone()
    }

    /// Unconditional refresh, coalesced with one already in flight.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let observed = self.generation.load(Ordering::SeqCst);
        self.single_flight(observed, |_| true).await
    }

    /// Refreshes only when the access token is missing or past expiry.
    pub async fn ensure_fresh(&self) -> Result<(), AuthError> {
        let observed = self.generation.load(Ordering::SeqCst);
        {
            let record = self.record.read().await;
            if record.is_fresh() {
                return Ok(());
            }
            if !record.has_refresh_token() {
                return Err(AuthError::Unauthenticated);
            }
        }
        self.single_flight(observed, |record| !record.is_fresh()).await
    }

    /// Refresh after the upstream rejected `rejected_token`. If the record
    /// already carries a different access token, someone else refreshed in
    /// the meantime and no request is made.
    pub async fn refresh_rejected(&self, rejected_token: &str) -> Result<(), AuthError> {
        let observed = self.generation.load(Ordering::SeqCst);
        self.single_flight(observed, |record| {
            record.access_token.as_deref() == Some(rejected_token)
        })
        .await
    }

    /// Installs the result of an authorization-code exchange.
    pub async fn seed(&self, response: &TokenResponse, started_at_ms: i64) -> TokenRecord {
        let mut last = self.refresh_gate.lock().await;
        let record = self.apply(response, started_at_ms).await;
        *last = Some(Ok(()));
        self.generation.fetch_add(1, Ordering::SeqCst);
        record
    }

    async fn single_flight<F>(&self, observed: u64, still_needed: F) -> Result<(), AuthError>
    where
        F: Fn(&TokenRecord) -> bool,
    {
        let mut last = self.refresh_gate.lock().await;

        if self.generation.load(Ordering::SeqCst) != observed {
            if let Some(outcome) = last.as_ref() {
                debug!("joined outcome of concurrent refresh");
                return outcome.clone();
            }
        }
        if !still_needed(&*self.record.read().await) {
            return Ok(());
        }

        let outcome = self.refresh_locked().await;
        *last = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Caller holds `refresh_gate`.
    async fn refresh_locked(&self) -> Result<(), AuthError> {
        let Some(refresh_token) = self.record.read().await.refresh_token.clone() else {
            return Err(AuthError::NoRefreshToken);
        };

        let metrics = get_metrics().await;
        let start = get_instant();
        let started_at_ms = now_millis();
        info!("refreshing access token with refresh token {}", redact(&refresh_token));

        let outcome = self
            .oauth
            .refresh(&refresh_token)
            .await
            .and_then(|response| match response.access_token {
                Some(_) => Ok(response),
                None => Err(AuthError::InvalidResponse("refresh response has no access_token".into())),
            });
        metrics.token_refresh_duration.observe(start.elapsed().as_secs_f64());

        match outcome {
            Ok(response) => {
                metrics.token_refreshes.with_label_values(&[OK_MSG]).inc();
                let record = self.apply(&response, started_at_ms).await;
                info!("access token refreshed, expires_at={}", record.expires_at);
                Ok(())
            }
            Err(e) => {
                metrics.token_refreshes.with_label_values(&[ERROR_MSG]).inc();
                warn!("token refresh failed, keeping previous record: {}", e);
                Err(e)
            }
        }
    }

    /// Merges a token response and writes it through. A failed write is
    /// logged only: the in-memory record stays authoritative.
    async fn apply(&self, response: &TokenResponse, started_at_ms: i64) -> TokenRecord {
        let record = {
            let mut current = self.record.write().await;
            current.merge(response, started_at_ms);
            current.clone()
        };

        let metrics = get_metrics().await;
        metrics.authenticated.set(i64::from(!record.is_empty()));
        if let Err(e) = self.store.save(&record).await {
            metrics.store_write_failures.inc();
            error!("persisting token record failed, continuing in memory: {}", e);
        }
        record
    }
}
