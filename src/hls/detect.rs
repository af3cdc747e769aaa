use url::Url;

/// MIME fragment shared by every HLS playlist type
/// (`application/vnd.apple.mpegurl`, `application/x-mpegURL`, `audio/mpegurl`, ...).
const HLS_MIME_MARKER: &str = "mpegurl";

/// Playlist file extension used when the origin sends no Content-Type.
const PLAYLIST_EXTENSION: &str = ".m3u8";

/// Default Content-Type for a playlist detected by extension alone.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Decide whether an origin response is an HLS playlist to be rewritten.
///
/// Must be called before the body is consumed. An explicit Content-Type is
/// authoritative: `video/mp2t` on a `.m3u8` path is treated as binary. The
/// extension is consulted only when the origin declares no type at all.
pub fn is_playlist(content_type: Option<&str>, target: &Url) -> bool {
    match content_type.map(str::trim).filter(|ct| !ct.is_empty()) {
        Some(ct) => ct.to_ascii_lowercase().contains(HLS_MIME_MARKER),
        None => target
            .path()
            .to_ascii_lowercase()
            .ends_with(PLAYLIST_EXTENSION),
    }
}
