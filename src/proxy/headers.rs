//! Header plumbing between the inbound request, the upstream and the caller.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri, header};
use serde_json::{Map, Value};
use tracing::debug;
use url::form_urlencoded;

/// Query parameter carrying the upstream URL
pub const DESTINATION_PARAM: &str = "destination";

/// Connection-level or transport-owned headers that never cross the relay.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "expect",
    "te",
    "trailer",
    "proxy-connection",
    "proxy-authorization",
    "content-length",
    "accept-encoding",
];

/// Browser-settable aliases for headers that fetch() refuses to send.
const BROWSER_ALIASES: &[(&str, &str)] = &[
    ("x-cookie", "cookie"),
    ("x-referer", "referer"),
    ("x-origin", "origin"),
    ("x-user-agent", "user-agent"),
    ("x-x-real-ip", "x-real-ip"),
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn is_browser_alias(name: &str) -> bool {
    BROWSER_ALIASES
        .iter()
        .any(|(alias, _)| name.eq_ignore_ascii_case(alias))
}

/// Ordered, case-insensitive header collection.
///
/// Setting a name that is already present replaces its value in place, so
/// merging never concatenates values and never reorders existing entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Parse and set a header from strings.
    ///
    /// Returns `false` and leaves the set untouched when the name or value
    /// is not valid on the wire.
    pub fn insert(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.set(name, value);
                true
            }
            _ => {
                debug!("Skipping invalid header {:?}", name);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.as_str().eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Drop every header whose name matches an entry of `blacklist`,
    /// ignoring ASCII case.
    pub fn remove_blacklisted(&mut self, blacklist: &[String]) {
        self.entries.retain(|(name, _)| {
            !blacklist
                .iter()
                .any(|b| name.as_str().eq_ignore_ascii_case(b.trim()))
        });
    }

    /// Layer `other` on top of `self`; equal names take `other`'s value.
    pub fn merge(&mut self, other: &HeaderSet) {
        for (name, value) in &other.entries {
            self.set(name.clone(), value.clone());
        }
    }

    /// Set every pair whose value is present; `None` values are skipped.
    pub fn extend_defined<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in pairs {
            if let Some(value) = value {
                self.insert(name.as_ref(), value.as_ref());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn into_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.entries {
            map.insert(name, value);
        }
        map
    }

    /// JSON object view used for request debug logging.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(n, v)| {
                (
                    n.as_str().to_string(),
                    Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()),
                )
            })
            .collect();
        Value::Object(map)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (name, value) in iter {
            set.insert(name.as_ref(), value.as_ref());
        }
        set
    }
}

/// Headers from the inbound request that are safe to forward upstream.
///
/// Hop-by-hop headers and the `X-*` browser aliases are dropped; repeated
/// names are folded into one comma-separated value.
pub fn proxy_request_headers(inbound: &HeaderMap) -> HeaderSet {
    let mut set = HeaderSet::new();

    for name in inbound.keys() {
        if is_hop_by_hop(name.as_str()) || is_browser_alias(name.as_str()) {
            continue;
        }

        let values: Vec<&[u8]> = inbound.get_all(name).iter().map(|v| v.as_bytes()).collect();
        let folded = values.join(&b", "[..]);
        if let Ok(value) = HeaderValue::from_bytes(&folded) {
            set.set(name.clone(), value);
        }
    }

    set
}

/// Resolve `X-Cookie`, `X-Referer` and friends into the real header names.
pub fn browser_alias_headers(inbound: &HeaderMap) -> HeaderSet {
    let mut set = HeaderSet::new();
    for (alias, target) in BROWSER_ALIASES {
        if let Some(value) = inbound.get(*alias) {
            set.set(HeaderName::from_static(*target), value.clone());
        }
    }
    set
}

/// Header-carrying query pairs: everything except `destination`, in order.
pub fn extract_headers_from_query(uri: &Uri) -> Vec<(String, String)> {
    let Some(query) = uri.query() else {
        return Vec::new();
    };

    form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key != DESTINATION_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// The `destination` query parameter, percent-decoded.
pub fn destination_from_query(uri: &Uri) -> Option<String> {
    form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == DESTINATION_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Headers to send back to the caller for an upstream response.
///
/// Starts from the upstream headers minus hop-by-hop entries, then opens the
/// response to cross-origin players and exposes the final URL and cookies.
pub fn after_response_headers(upstream: &HeaderMap, final_url: &str) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 5);

    for (name, value) in upstream {
        if matches!(
            name.as_str(),
            "connection" | "keep-alive" | "transfer-encoding" | "upgrade" | "trailer" | "te"
        ) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));

    if let Ok(value) = HeaderValue::from_str(final_url) {
        headers.insert(HeaderName::from_static("x-final-destination"), value);
    }

    let set_cookie = HeaderName::from_static("x-set-cookie");
    for cookie in upstream.get_all(header::SET_COOKIE) {
        headers.append(set_cookie.clone(), cookie.clone());
    }

    headers
}
