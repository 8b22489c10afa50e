use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::service::OAuthConfig;
use crate::errors::AuthError;
use crate::utils::constants::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};

/// Token endpoint payload. Every field is optional so a partial response can
/// be merged without clearing what the gateway already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Form-encoded client for the authorization server's token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    cfg: OAuthConfig,
    client: Client,
}

impl OAuthClient {
    pub fn new(cfg: OAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self { cfg, client })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.cfg
    }

    /// `grant_type=refresh_token`; a rejection maps to `RefreshFailed`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let mut form = vec![
            ("grant_type", GRANT_REFRESH_TOKEN.to_owned()),
            ("client_id", self.cfg.client_id.clone()),
            ("client_secret", self.cfg.client_secret.clone()),
            ("refresh_token", refresh_token.to_owned()),
        ];
        if let Some(audience) = &self.cfg.audience {
            form.push(("audience", audience.clone()));
        }
        self.post_form(form, |status, body| AuthError::RefreshFailed { status, body })
            .await
    }

    /// `grant_type=authorization_code`; a rejection maps to `ExchangeFailed`.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let mut form = vec![
            ("grant_type", GRANT_AUTHORIZATION_CODE.to_owned()),
            ("client_id", self.cfg.client_id.clone()),
            ("client_secret", self.cfg.client_secret.clone()),
            ("code", code.to_owned()),
            ("redirect_uri", self.cfg.redirect_uri.clone()),
        ];
        if let Some(audience) = &self.cfg.audience {
            form.push(("audience", audience.clone()));
        }
        self.post_form(form, |status, body| AuthError::ExchangeFailed { status, body })
            .await
    }

    async fn post_form(
        &self,
        form: Vec<(&'static str, String)>,
        rejected: fn(u16, String) -> AuthError,
    ) -> Result<TokenResponse, AuthError> {
        debug!("POST {} grant_type={}", self.cfg.token_url, form[0].1);
        let response = self
            .client
            .post(&self.cfg.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!("token endpoint answered {}: {}", status, body);
            return Err(rejected(status.as_u16(), body));
        }

        serde_json::from_str::<TokenResponse>(&body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}
