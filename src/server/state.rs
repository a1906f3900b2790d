use crate::{
    config::Config,
    error::Result,
    metrics,
    proxy::{
        Proxy,
        request::{RequestDebugLog, TracingDebugLog},
        transport::ReqwestTransport,
    },
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Relay pipeline backed by a pooled HTTP client
    pub proxy: Proxy,
    /// Prometheus handle, absent if another recorder owns the process
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::build()?);

        let mut proxy = Proxy::new(transport).with_max_playlist_bytes(config.max_playlist_bytes);
        if config.req_debug {
            let debug_log: Arc<dyn RequestDebugLog> = Arc::new(TracingDebugLog);
            proxy = proxy.with_debug_log(debug_log);
        }

        Ok(Self {
            config: Arc::new(config),
            proxy,
            metrics: metrics::init(),
            started_at: Instant::now(),
        })
    }
}
