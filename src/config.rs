use std::env;

/// Headers stripped from every forwarded request unless the caller
/// re-introduces them through explicit overrides
pub const DEFAULT_BLACKLISTED_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "cf-worker",
    "cf-ray",
    "cf-visitor",
    "cf-ew-via",
    "cf-ipcountry",
    "cdn-loop",
    "x-amzn-trace-id",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "forwarded",
    "x-real-ip",
];

/// Upper bound for a buffered playlist body (8 MiB)
pub const DEFAULT_MAX_PLAYLIST_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound for a buffered inbound request body (16 MiB)
pub const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Log method, url and headers of every outbound request (`REQ_DEBUG=true`)
    pub req_debug: bool,
    /// Header names removed from forwarded requests (case-insensitive)
    pub blacklisted_headers: Vec<String>,
    /// Permit destinations on loopback/private IP literals
    pub allow_private_destinations: bool,
    pub max_playlist_bytes: usize,
    pub max_request_body_bytes: usize,
    /// Pipe inbound request bodies to the upstream instead of buffering them
    pub stream_requests: bool,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env_flag("DEV_MODE");

        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        // Only the exact string "true" turns request logging on
        let req_debug = env::var("REQ_DEBUG").is_ok_and(|v| v == "true");

        let blacklisted_headers = match env::var("BLACKLISTED_HEADERS") {
            Ok(list) => parse_header_list(&list),
            Err(_) => DEFAULT_BLACKLISTED_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        };

        let max_playlist_bytes = env::var("MAX_PLAYLIST_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_PLAYLIST_BYTES);

        let max_request_body_bytes = env::var("MAX_REQUEST_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_REQUEST_BODY_BYTES);

        Ok(Config {
            port,
            is_dev,
            req_debug,
            blacklisted_headers,
            allow_private_destinations: env_flag("ALLOW_PRIVATE_DESTINATIONS"),
            max_playlist_bytes,
            max_request_body_bytes,
            stream_requests: env_flag("STREAM_REQUESTS"),
        })
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .unwrap_or_else(|_| "false".to_string())
        .parse()
        .unwrap_or(false)
}

/// Split a comma-separated header list, dropping empty entries
fn parse_header_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}
