//! End-to-end tests for the relay
//!
//! Starts a real Axum server on a random port in front of a wiremock
//! upstream and follows rewritten playlist URLs the way a player would.

use hlsrelay::config::Config;
use hlsrelay::hls::rewriter::encode_uri_component;
use hlsrelay::server::build_router;
use std::net::SocketAddr;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MPEGURL: &str = "application/vnd.apple.mpegurl";

// ── Test server helpers ───────────────────────────────────────────────────────

async fn start_relay() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();

    let config = Config {
        port: 0,
        is_dev: true,
        req_debug: false,
        blacklisted_headers: vec!["x-forwarded-for".to_string()],
        allow_private_destinations: true,
        max_playlist_bytes: 1024 * 1024,
        max_request_body_bytes: 1024 * 1024,
        stream_requests: true,
    };

    let app = build_router(config).unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Resolve a playlist line against the relay the way a player does.
fn follow(relay: SocketAddr, line: &str) -> String {
    if line.starts_with("http") {
        line.to_string()
    } else {
        format!("http://{}/{}", relay, line)
    }
}

fn uri_lines(body: &str) -> Vec<&str> {
    body.lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn player_walks_master_variant_and_segment_through_relay() {
    let upstream = MockServer::start().await;
    let base = upstream.uri();
    let segment = vec![0x47u8; 188 * 4];

    Mock::given(method("GET"))
        .and(path("/vod/master.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\n{base}/vod/hd/index.m3u8\n"),
            MPEGURL,
        ))
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/vod/hd/index.m3u8"))
        .and(header("referer", "https://site.example"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nseg0.ts\n#EXT-X-ENDLIST\n",
            MPEGURL,
        ))
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/vod/hd/seg0.ts"))
        .and(header("referer", "https://site.example"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(segment.clone(), "video/mp2t"))
        .expect(1)
        .mount(&upstream)
        .await;

    let relay = start_relay().await;
    let client = reqwest::Client::new();

    // Master playlist: absolute variant URL becomes a relay URL
    let master_url = format!(
        "http://{}/?destination={}&Referer={}",
        relay,
        encode_uri_component(&format!("{base}/vod/master.m3u8")),
        encode_uri_component("https://site.example")
    );
    let resp = client.get(&master_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], MPEGURL);
    let master = resp.text().await.unwrap();
    let variant = uri_lines(&master)[0].to_string();
    assert!(
        variant.starts_with(&format!("http://{}/?destination=", relay)),
        "variant not routed through relay: {variant}"
    );
    assert!(variant.ends_with("&Referer=https%3A%2F%2Fsite.example"));

    // Variant playlist: relative segment becomes a relative relay query
    let resp = client.get(follow(relay, &variant)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let media = resp.text().await.unwrap();
    let segment_line = uri_lines(&media)[0].to_string();
    assert_eq!(
        segment_line,
        format!("?destination={base}/vod/hd/seg0.ts&Referer=https%3A%2F%2Fsite.example")
    );

    // Segment: bytes arrive untouched, with the forwarded Referer upstream
    let resp = client.get(follow(relay, &segment_line)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "video/mp2t");
    assert_eq!(resp.bytes().await.unwrap().to_vec(), segment);
}

#[tokio::test]
async fn list_manifest_sub_playlists_resolve_against_directory() {
    let upstream = MockServer::start().await;
    let base = upstream.uri();

    Mock::given(method("GET"))
        .and(path("/vod/list5000.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=5000\nchunklist.m3u8\n",
            MPEGURL,
        ))
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/vod/chunklist.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("#EXTM3U\n#EXT-X-ENDLIST\n", MPEGURL))
        .expect(1)
        .mount(&upstream)
        .await;

    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let url = format!(
        "http://{}/?destination={}",
        relay,
        encode_uri_component(&format!("{base}/vod/list5000.m3u8"))
    );
    let body = client.get(&url).send().await.unwrap().text().await.unwrap();
    let line = uri_lines(&body)[0].to_string();
    assert_eq!(
        line,
        format!(
            "?destination={}/chunklist.m3u8",
            encode_uri_component(&format!("{base}/vod"))
        )
    );

    let resp = client.get(follow(relay, &line)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "#EXTM3U\n#EXT-X-ENDLIST\n");
}

#[tokio::test]
async fn streamed_request_body_reaches_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&upstream)
        .await;

    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let payload = "x".repeat(64 * 1024);
    let url = format!(
        "http://{}/?destination={}",
        relay,
        encode_uri_component(&format!("{}/upload", upstream.uri()))
    );
    let resp = client.put(&url).body(payload.clone()).send().await.unwrap();
    assert_eq!(resp.status(), 201);

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body.len(), payload.len());
}
