use crate::{
    error::{RelayError, Result},
    metrics,
    proxy::{
        headers::{browser_alias_headers, destination_from_query, extract_headers_from_query},
        request::{FetchOverrides, ProxyOptions},
    },
    server::{state::AppState, url_validation::validate_destination},
};
use axum::{
    extract::{Request, State},
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Relay any request to the URL in its `destination` query parameter
///
/// All other query parameters are sent upstream as headers and carried over
/// into every URL of a rewritten playlist.
pub async fn serve_proxy(State(state): State<AppState>, request: Request) -> Result<Response> {
    let start = Instant::now();

    let result = relay(&state, request).await;

    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status(),
    };
    metrics::record_request("proxy", status.as_u16());
    metrics::record_duration("proxy", start);

    result
}

async fn relay(state: &AppState, request: Request) -> Result<Response> {
    let destination =
        destination_from_query(request.uri()).ok_or(RelayError::MissingDestination)?;
    validate_destination(&destination, state.config.allow_private_destinations)?;

    info!("Relaying {} to {}", request.method(), destination);

    let options = ProxyOptions {
        method: None,
        headers: extract_headers_from_query(request.uri())
            .into_iter()
            .collect(),
        fetch: FetchOverrides {
            method: None,
            headers: browser_alias_headers(request.headers()),
        },
        blacklisted_headers: state.config.blacklisted_headers.clone(),
        stream_request: state.config.stream_requests,
        max_body_bytes: state.config.max_request_body_bytes,
    };

    state.proxy.proxy_request(request, &destination, options).await
}
