//! Delivers upstream responses to the caller, rewriting HLS playlists on the way.

use super::headers::{after_response_headers, destination_from_query, extract_headers_from_query};
use super::transport::UpstreamResponse;
use crate::hls::rewriter::{RewriteContext, forwarded_header_query, rewrite_playlist};
use crate::hls::{PLAYLIST_CONTENT_TYPE, is_playlist_content_type};
use crate::metrics;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::Response,
};
use tracing::{debug, warn};

/// What the interceptor needs to know about the request that started it all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundContext {
    /// Scheme the relay was reached on
    pub protocol: String,
    /// Host (and port) the relay was reached on
    pub host: String,
    /// Upstream URL the inbound request asked for
    pub destination: Option<String>,
    /// Header-carrying query pairs of the inbound request
    pub forwarded_headers: Vec<(String, String)>,
}

impl InboundContext {
    pub fn from_parts(parts: &Parts) -> Self {
        let protocol = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| v.eq_ignore_ascii_case("https"))
            .map_or("http", |_| "https")
            .to_string();

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            protocol,
            host,
            destination: destination_from_query(&parts.uri),
            forwarded_headers: extract_headers_from_query(&parts.uri),
        }
    }
}

/// Turn an upstream response into the response sent to the caller.
///
/// Playlists are buffered (up to `max_playlist_bytes`) and rewritten; anything
/// else streams through untouched. Status and adjusted headers are always
/// delivered, even when the playlist body cannot be read or decoded.
pub async fn intercept(
    upstream: UpstreamResponse,
    ctx: &InboundContext,
    max_playlist_bytes: usize,
) -> Response {
    if is_playlist_content_type(upstream.content_type()) {
        rewrite(upstream, ctx, max_playlist_bytes).await
    } else {
        passthrough(upstream)
    }
}

fn passthrough(upstream: UpstreamResponse) -> Response {
    let headers = after_response_headers(&upstream.headers, &upstream.url);
    build(upstream.status, headers, upstream.body)
}

async fn rewrite(upstream: UpstreamResponse, ctx: &InboundContext, limit: usize) -> Response {
    let UpstreamResponse {
        status,
        headers,
        url,
        body,
    } = upstream;

    let mut headers = after_response_headers(&headers, &url);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
    );
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_RANGE);
    headers.remove(header::ETAG);

    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to buffer playlist from {}: {}", url, e);
            return build(status, headers, Body::empty());
        }
    };

    let text = match std::str::from_utf8(&bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("Playlist from {} is not valid UTF-8, forwarding as is: {}", url, e);
            return build(status, headers, Body::from(bytes));
        }
    };

    let header_query = forwarded_header_query(&ctx.forwarded_headers);
    let rewrite_ctx = RewriteContext {
        protocol: &ctx.protocol,
        host: &ctx.host,
        destination: ctx.destination.as_deref(),
        header_query: &header_query,
    };

    let rewritten = rewrite_playlist(text, &rewrite_ctx);
    debug!(
        "Rewrote playlist from {} ({} lines rewritten)",
        url, rewritten.rewritten_lines
    );
    metrics::record_playlist_rewrite(rewritten.rewritten_lines);

    // Body is now plain text regardless of how upstream encoded it
    headers.remove(header::CONTENT_ENCODING);

    build(status, headers, Body::from(rewritten.body))
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
