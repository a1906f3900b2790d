pub mod rewriter;

/// Content type that marks an upstream response as an HLS playlist
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Whether a `Content-Type` value denotes an HLS playlist.
///
/// An absent header is never a playlist.
pub fn is_playlist_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.contains(PLAYLIST_CONTENT_TYPE))
}
