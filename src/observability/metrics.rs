use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token lifecycle
    pub token_refreshes: IntCounterVec,
    pub token_refresh_duration: Histogram,
    pub code_exchanges: IntCounterVec,
    pub store_write_failures: IntCounter,
    pub authenticated: IntGauge,

    // Upstream
    pub upstream_requests: IntCounterVec,
    pub upstream_duration: Histogram,

    // Gateway
    pub api_key_rejections: IntCounter,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("vehiclegateway".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Token lifecycle
            token_refreshes: IntCounterVec::new(Opts::new("token_refreshes_total", "Refresh grants by outcome"),&["outcome"],).unwrap(),
            token_refresh_duration: Histogram::with_opts(HistogramOpts::new("token_refresh_duration_seconds", "Refresh grant duration seconds").buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])).unwrap(),
            code_exchanges: IntCounterVec::new(Opts::new("code_exchanges_total", "Authorization code exchanges by outcome"),&["outcome"],).unwrap(),
            store_write_failures: IntCounter::new("token_store_write_failures_total", "Failed token record writes").unwrap(),
            authenticated: IntGauge::new("authenticated", "1 if the gateway holds any credential").unwrap(),

            // Upstream
            upstream_requests: IntCounterVec::new(Opts::new("upstream_requests_total", "Upstream requests by status class"),&["status"],).unwrap(),
            upstream_duration: Histogram::with_opts(HistogramOpts::new("upstream_request_duration_seconds", "Upstream request duration seconds").buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])).unwrap(),

            api_key_rejections: IntCounter::new("api_key_rejections_total", "API requests rejected for a missing or wrong key").unwrap(),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors during startup",).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_refreshes.clone())).unwrap();
        reg.register(Box::new(metrics.token_refresh_duration.clone())).unwrap();
        reg.register(Box::new(metrics.code_exchanges.clone())).unwrap();
        reg.register(Box::new(metrics.store_write_failures.clone())).unwrap();
        reg.register(Box::new(metrics.authenticated.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_requests.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_duration.clone())).unwrap();
        reg.register(Box::new(metrics.api_key_rejections.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
