use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tracing::{info, warn};
use url::Url;

use crate::errors::AuthError;
use crate::helpers::time::now_millis;
use crate::observability::metrics::get_metrics;
use crate::token::manager::TokenManager;
use crate::token::record::TokenRecord;
use crate::token::store::TokenStore;

static OK_MSG: &str = "ok";
static ERROR_MSG: &str = "error";

/// Where to send the user, and the state value the caller must keep (e.g. in
/// a short-lived cookie) to compare on callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub state: String,
}

impl<S: TokenStore> TokenManager<S> {
    /// The state is not retained here; comparing it is the callback's job.
    pub fn build_authorization_redirect(&self) -> Result<AuthorizationRedirect, url::ParseError> {
        let cfg = self.oauth().config();
        let state = generate_state();

        let mut url = Url::parse(&cfg.authorize_url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &cfg.client_id)
                .append_pair("redirect_uri", &cfg.redirect_uri)
                .append_pair("scope", &cfg.scopes.join(" "))
                .append_pair("state", &state);
            for (k, v) in &cfg.extra_authorize_params {
                query.append_pair(k, v);
            }
        }
        Ok(AuthorizationRedirect { url, state })
    }

    /// Trades an authorization code for the initial token pair. On failure
    /// the current record is left exactly as it was.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord, AuthError> {
        let metrics = get_metrics().await;
        let started_at_ms = now_millis();

        let response = self
            .oauth()
            .exchange_code(code)
            .await
            .and_then(|response| match response.access_token {
                Some(_) => Ok(response),
                None => Err(AuthError::InvalidResponse("exchange response has no access_token".into())),
            })
            .inspect_err(|e| {
                metrics.code_exchanges.with_label_values(&[ERROR_MSG]).inc();
                warn!("authorization code exchange failed: {}", e);
            })?;

        metrics.code_exchanges.with_label_values(&[OK_MSG]).inc();
        let record = self.seed(&response, started_at_ms).await;
        info!(
            "authorization code exchanged, refresh_token={}, expires_at={}",
            record.refresh_token.is_some(),
            record.expires_at
        );
        Ok(record)
    }
}

/// 32 random bytes, base64url without padding.
pub fn generate_state() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}
