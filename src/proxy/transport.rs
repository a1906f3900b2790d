//! Upstream transport: sends a [`ProxyRequest`] and hands back a streaming response.

use super::request::{ProxyBody, ProxyRequest};
use crate::error::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Upstream response with its body still unread.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: String,
    pub body: Body,
}

impl UpstreamResponse {
    /// First `Content-Type` value, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Performs the actual upstream exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once response headers are in; the body streams afterwards.
    async fn send(&self, request: ProxyRequest) -> Result<UpstreamResponse>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client tuned for many small segment fetches against few hosts.
    pub fn build() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ProxyRequest) -> Result<UpstreamResponse> {
        let duplex = request.duplex;
        let mut builder = self
            .client
            .request(request.method, &request.target_url)
            .headers(request.headers.into_header_map());

        builder = match request.body {
            Some(ProxyBody::Buffered(bytes)) => builder.body(bytes),
            // Chunked upload; the response is read as soon as its headers arrive
            Some(ProxyBody::Streamed(body)) => {
                builder.body(reqwest::Body::wrap_stream(body.into_data_stream()))
            }
            None => builder,
        };

        debug!(
            "Sending upstream request to {} (duplex: {:?})",
            request.target_url, duplex
        );

        let response = builder.send().await?;

        Ok(UpstreamResponse {
            status: response.status(),
            headers: response.headers().clone(),
            url: response.url().to_string(),
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::headers::HeaderSet;
    use crate::proxy::request::Duplex;
    use axum::body::Bytes;
    use axum::http::Method;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(method: Method, url: String, body: Option<ProxyBody>) -> ProxyRequest {
        let duplex = matches!(body, Some(ProxyBody::Streamed(_))).then_some(Duplex::Half);
        ProxyRequest {
            method,
            target_url: url,
            headers: [("x-token", "abc")].into_iter().collect::<HeaderSet>(),
            body,
            duplex,
        }
    }

    #[tokio::test]
    async fn forwards_method_headers_and_buffered_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(header("x-token", "abc"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(201).insert_header("x-upstream", "yes"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::build().unwrap();
        let resp = transport
            .send(request(
                Method::POST,
                format!("{}/api", server.uri()),
                Some(ProxyBody::Buffered(Bytes::from_static(b"hello"))),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.headers["x-upstream"], "yes");
        assert!(resp.url.ends_with("/api"));
    }

    #[tokio::test]
    async fn streams_request_body_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(body_string("chunk-1chunk-2"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let stream = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"chunk-1")),
            Ok(Bytes::from_static(b"chunk-2")),
        ]);

        let transport = ReqwestTransport::build().unwrap();
        let resp = transport
            .send(request(
                Method::PUT,
                server.uri(),
                Some(ProxyBody::Streamed(Body::from_stream(stream))),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn response_body_is_streamed_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp2t")
                    .set_body_bytes(vec![0x47u8, 0x40, 0x00]),
            )
            .mount(&server)
            .await;

        let transport = ReqwestTransport::build().unwrap();
        let resp = transport
            .send(request(Method::GET, server.uri(), None))
            .await
            .unwrap();

        assert_eq!(resp.content_type(), Some("video/mp2t"));
        let bytes = axum::body::to_bytes(resp.body, usize::MAX).await.unwrap();
        assert_eq!(bytes.to_vec(), vec![0x47u8, 0x40, 0x00]);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error() {
        let transport = ReqwestTransport::build().unwrap();
        let result = transport
            .send(request(Method::GET, "http://127.0.0.1:9/".to_string(), None))
            .await;
        assert!(result.is_err());
    }
}
