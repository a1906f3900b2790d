//! Builds the outbound request description from an inbound request.

use super::headers::{HeaderSet, proxy_request_headers};
use crate::config::DEFAULT_MAX_REQUEST_BODY_BYTES;
use axum::{
    body::{Body, Bytes},
    http::{Method, request::Parts},
};
use tracing::{debug, info};

/// Methods whose inbound body is forwarded upstream.
const PAYLOAD_METHODS: [Method; 4] = [Method::PATCH, Method::POST, Method::PUT, Method::DELETE];

pub fn is_payload_method(method: &Method) -> bool {
    PAYLOAD_METHODS.contains(method)
}

/// How the outbound body is delivered to the transport.
#[derive(Debug)]
pub enum ProxyBody {
    /// Fully read inbound body
    Buffered(Bytes),
    /// Live inbound body, piped chunk by chunk
    Streamed(Body),
}

/// Transport mode for streamed bodies: the response may start arriving
/// while the request body is still being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
}

/// Overrides scoped to the upstream fetch itself; these win over
/// [`ProxyOptions::headers`] and [`ProxyOptions::method`].
#[derive(Debug, Clone, Default)]
pub struct FetchOverrides {
    pub method: Option<Method>,
    pub headers: HeaderSet,
}

/// Caller-supplied knobs for a single proxied request.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub method: Option<Method>,
    /// General header overrides
    pub headers: HeaderSet,
    pub fetch: FetchOverrides,
    /// Header names stripped from the inbound headers (case-insensitive)
    pub blacklisted_headers: Vec<String>,
    /// Pipe the inbound body instead of buffering it
    pub stream_request: bool,
    /// Cap for the buffered body; bodies over the cap are dropped
    pub max_body_bytes: usize,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            method: None,
            headers: HeaderSet::new(),
            fetch: FetchOverrides::default(),
            blacklisted_headers: Vec::new(),
            stream_request: false,
            max_body_bytes: DEFAULT_MAX_REQUEST_BODY_BYTES,
        }
    }
}

/// Fully-formed request ready for the upstream transport.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub target_url: String,
    pub headers: HeaderSet,
    /// Only ever set for PATCH, POST, PUT and DELETE
    pub body: Option<ProxyBody>,
    /// `Some(Half)` exactly when the body is streamed
    pub duplex: Option<Duplex>,
}

impl ProxyRequest {
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Some(ProxyBody::Streamed(_)))
    }
}

/// Sink for per-request debug records.
pub trait RequestDebugLog: Send + Sync {
    fn log_request(&self, method: &Method, url: &str, headers: &HeaderSet);

    /// Whether this sink records anything at all
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Default sink: records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDebugLog;

impl RequestDebugLog for NoopDebugLog {
    fn log_request(&self, _method: &Method, _url: &str, _headers: &HeaderSet) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Emits one structured `tracing` event per outbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDebugLog;

impl RequestDebugLog for TracingDebugLog {
    fn log_request(&self, method: &Method, url: &str, headers: &HeaderSet) {
        info!(
            kind = "request",
            method = %method,
            url = %url,
            headers = %headers.to_json(),
            "outbound request"
        );
    }
}

/// Translate one inbound request into the outbound request description.
///
/// Never fails: a body that cannot be buffered is dropped and the request
/// goes out without one.
pub async fn compose_request(
    parts: &Parts,
    body: Body,
    target: &str,
    options: ProxyOptions,
    debug_log: &dyn RequestDebugLog,
) -> ProxyRequest {
    let (body, duplex) = if is_payload_method(&parts.method) {
        if options.stream_request {
            (Some(ProxyBody::Streamed(body)), Some(Duplex::Half))
        } else {
            match axum::body::to_bytes(body, options.max_body_bytes).await {
                Ok(bytes) => (Some(ProxyBody::Buffered(bytes)), None),
                Err(e) => {
                    debug!("Dropping unreadable request body: {}", e);
                    (None, None)
                }
            }
        }
    } else {
        (None, None)
    };

    let method = options
        .fetch
        .method
        .or(options.method)
        .unwrap_or_else(|| parts.method.clone());

    let mut headers = proxy_request_headers(&parts.headers);
    headers.remove_blacklisted(&options.blacklisted_headers);
    headers.merge(&options.headers);
    headers.merge(&options.fetch.headers);

    debug_log.log_request(&method, target, &headers);

    ProxyRequest {
        method,
        target_url: target.to_string(),
        headers,
        body,
        duplex,
    }
}
