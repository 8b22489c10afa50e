//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Checks server, logging and metrics settings
//! - Checks OAuth client, endpoint urls and timeouts
//! - Checks the upstream base url and the token store path

use anyhow::{anyhow, Result};
use tracing::{error, info};
use url::Url;

use crate::config::service::{OAuthConfig, ServiceConfig, UpstreamConfig};
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;

/// Public entrypoint: returns Ok(()) or one error listing every issue found.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<()> {
    let errors = collect_errors(cfg);

    if errors.is_empty() {
        info!("config is valid");
        return Ok(());
    }

    for e in &errors {
        error!(" - {}", e);
    }
    get_metrics().await.config_validation_errors.inc_by(errors.len() as u64);
    Err(anyhow!(
        "config is not valid, total errors:{}, \n{}",
        errors.len(),
        errors.join("\n")
    ))
}

pub fn collect_errors(cfg: &ServiceConfig) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_oauth(&cfg.oauth, &mut errors);
    validate_upstream(&cfg.upstream, &mut errors);

    if cfg.token_store.path.trim().is_empty() {
        errors.push("token_store.path must not be empty".to_string());
    }
    if cfg.api_key.trim().is_empty() {
        errors.push("api_key must not be empty".to_string());
    }
    errors
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.server.host.is_empty() {
        errors.push(format!(
            "settings.server.host '{}' must be valid",
            settings.server.host
        ));
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    // metrics endpoint start with '/'
    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    // logging level
    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, valid
            ));
        }
    }
}

fn validate_oauth(oauth: &OAuthConfig, errors: &mut Vec<String>) {
    if oauth.client_id.trim().is_empty() {
        errors.push("oauth.client_id must not be empty".to_string());
    }
    if oauth.client_secret.trim().is_empty() {
        errors.push("oauth.client_secret must not be empty".to_string());
    }
    validate_url("oauth.authorize_url", &oauth.authorize_url, errors);
    validate_url("oauth.token_url", &oauth.token_url, errors);
    validate_url("oauth.redirect_uri", &oauth.redirect_uri, errors);
    if oauth.timeout_ms == 0 {
        errors.push("oauth.timeout_ms must be greater than 0".to_string());
    }
}

fn validate_upstream(upstream: &UpstreamConfig, errors: &mut Vec<String>) {
    validate_url("upstream.base_url", &upstream.base_url, errors);
    if upstream.timeout_ms == 0 {
        errors.push("upstream.timeout_ms must be greater than 0".to_string());
    }
}

fn validate_url(field: &str, value: &str, errors: &mut Vec<String>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!("{} '{}' has unsupported scheme '{}'", field, value, url.scheme())),
        Err(e) => errors.push(format!("{} '{}' is not a valid url: {}", field, value, e)),
    }
}
