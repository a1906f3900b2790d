//! Streaming HTTP relay for HLS.
//!
//! Requests are forwarded to the URL named by their `destination` query
//! parameter. When the upstream answers with an HLS playlist, every URI in it
//! is rewritten to point back at the relay so segment and variant fetches
//! follow the same path, carrying the caller's custom headers along.

pub mod config;
pub mod error;
pub mod hls;
pub mod metrics;
pub mod proxy;
pub mod server;
