//! Prometheus metrics for the relay.
//!
//! Recording is always safe: without an installed recorder the `metrics`
//! macros are no-ops.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder once per process.
///
/// Returns `None` if another recorder was installed first.
pub fn init() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        })
        .clone()
}

/// Count a finished request by route and status code.
pub fn record_request(route: &'static str, status: u16) {
    counter!("hlsrelay_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}

/// Record how long a request took, measured from `start`.
pub fn record_duration(route: &'static str, start: Instant) {
    histogram!("hlsrelay_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_playlist_rewrite(lines: usize) {
    counter!("hlsrelay_playlists_rewritten_total").increment(1);
    counter!("hlsrelay_playlist_lines_rewritten_total").increment(lines as u64);
}

pub fn record_upstream_error() {
    counter!("hlsrelay_upstream_errors_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_handle_does_not_panic() {
        record_request("proxy", 200);
        record_duration("proxy", Instant::now());
        record_playlist_rewrite(3);
        record_upstream_error();
    }

    #[test]
    fn init_is_idempotent() {
        let first = init().is_some();
        let second = init().is_some();
        assert_eq!(first, second);
    }
}
