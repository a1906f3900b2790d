//! The request → upstream → response pipeline.
//!
//! [`Proxy::proxy_request`] ties the pieces together:
//! 1. capture what the response side needs from the inbound request
//! 2. compose the outbound request ([`request::compose_request`])
//! 3. hand it to the [`transport::Transport`]
//! 4. intercept the upstream response ([`response::intercept`])

pub mod headers;
pub mod request;
pub mod response;
pub mod transport;

use crate::config::DEFAULT_MAX_PLAYLIST_BYTES;
use crate::error::{RelayError, Result};
use crate::metrics;
use axum::{body::Body, http::Request, response::Response};
use request::{NoopDebugLog, ProxyOptions, RequestDebugLog, compose_request};
use response::{InboundContext, intercept};
use std::sync::Arc;
use tracing::debug;
use transport::Transport;

/// Stateless relay: every call works on its own request and response only.
#[derive(Clone)]
pub struct Proxy {
    transport: Arc<dyn Transport>,
    debug_log: Arc<dyn RequestDebugLog>,
    max_playlist_bytes: usize,
}

impl Proxy {
    /// Proxy with request debug logging off
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            debug_log: Arc::new(NoopDebugLog),
            max_playlist_bytes: DEFAULT_MAX_PLAYLIST_BYTES,
        }
    }

    pub fn with_debug_log(mut self, debug_log: Arc<dyn RequestDebugLog>) -> Self {
        self.debug_log = debug_log;
        self
    }

    /// True when outbound requests are recorded by the debug log
    pub fn logs_requests(&self) -> bool {
        self.debug_log.is_enabled()
    }

    pub fn with_max_playlist_bytes(mut self, max_playlist_bytes: usize) -> Self {
        self.max_playlist_bytes = max_playlist_bytes;
        self
    }

    /// Forward `request` to `target` and deliver the (possibly rewritten) response.
    ///
    /// # Errors
    /// [`RelayError::UpstreamFetch`] when no upstream response could be obtained.
    pub async fn proxy_request(
        &self,
        request: Request<Body>,
        target: &str,
        options: ProxyOptions,
    ) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let context = InboundContext::from_parts(&parts);

        let outbound =
            compose_request(&parts, body, target, options, self.debug_log.as_ref()).await;
        debug!("Proxying {} {}", outbound.method, target);

        let upstream = self.transport.send(outbound).await.inspect_err(|e| {
            if matches!(e, RelayError::UpstreamFetch(_)) {
                metrics::record_upstream_error();
            }
        })?;

        Ok(intercept(upstream, &context, self.max_playlist_bytes).await)
    }
}
