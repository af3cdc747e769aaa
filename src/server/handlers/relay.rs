//! The relay endpoint.
//!
//! Playlists are rewritten so every URI line points back at the relay.
//! Relative lines resolve against the URL the playlist was finally served
//! from, which is the requested target unless the origin redirected.
//! Everything else, including every non-2xx origin answer, streams through
//! untouched apart from the header policy in [`sanitize_passthrough_headers`].

use crate::{
    config::Config,
    error::Result,
    hls::{
        detect::{PLAYLIST_CONTENT_TYPE, is_playlist},
        rewrite::rewrite_playlist,
    },
    metrics,
    server::{state::AppState, target::resolve_target},
    upstream::{build_upstream_headers, fetch_origin},
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::Response,
};
use futures_util::StreamExt;
use std::time::Instant;
use tracing::{debug, info};

/// Headers describing the origin connection rather than the content.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that would stop the media from being embedded in the player page.
const EMBED_BLOCKING: &[&str] = &[
    "x-frame-options",
    "content-security-policy",
    "x-content-type-options",
];

/// Relay one request to the origin named by `?url=`.
///
/// Pipeline: resolve target → build headers → fetch → playlist rewrite or
/// binary pass-through. Every relay-detected error is terminal and mapped
/// by [`crate::error::RelayError`]; origin error statuses are relayed as-is.
pub async fn relay(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let start = Instant::now();

    relay_request(&state, method, &uri, &headers, target_param(&params), start)
        .await
        .inspect_err(|e| {
            metrics::record_request("error", e.status().as_u16());
            metrics::record_duration("error", start);
        })
}

/// The first `url` pair of the query string. Later repeats are ignored.
fn target_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.as_str())
}

async fn relay_request(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    raw_target: Option<&str>,
    start: Instant,
) -> Result<Response> {
    let target = resolve_target(raw_target, state.config.block_private_origins)?;
    info!("Relaying {} {}", method, target);

    let outbound = build_upstream_headers(&target, headers, &state.user_agent);
    let response = fetch_origin(&state.http_client, method, &target, outbound)
        .await
        .inspect_err(|_| metrics::record_upstream_error())?;

    // Classify before touching the body: the two paths consume it differently.
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    // Origin errors are relayed verbatim, whatever their path looks like.
    if response.status().is_success() && is_playlist(content_type.as_deref(), &target) {
        let base = relay_base(&state.config, headers, uri);
        serve_playlist(response, content_type, &base, start).await
    } else {
        Ok(stream_passthrough(response, start))
    }
}

/// Buffer, decode and rewrite a playlist so every URI points back at us.
async fn serve_playlist(
    response: reqwest::Response,
    content_type: Option<String>,
    relay_base: &str,
    start: Instant,
) -> Result<Response> {
    let status = response.status();
    let base = response.url().clone();
    let text = response.text().await?;

    let rewritten = rewrite_playlist(&text, &base, relay_base);
    info!(
        "Rewrote {} playlist URIs from {} ({} bytes)",
        rewritten.rewritten,
        base,
        text.len()
    );

    let content_type = content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(PLAYLIST_CONTENT_TYPE));

    let mut resp = Response::new(Body::from(rewritten.body));
    *resp.status_mut() = status;
    let out = resp.headers_mut();
    out.insert(header::CONTENT_TYPE, content_type);
    // Live playlists change between polls.
    out.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    metrics::record_rewritten_lines(rewritten.rewritten);
    metrics::record_request("playlist", status.as_u16());
    metrics::record_duration("playlist", start);

    Ok(resp)
}

/// Stream the origin body to the client untouched.
///
/// The body is never buffered. When the client goes away the response body
/// is dropped, which drops the upstream byte stream and closes the origin
/// connection with it.
fn stream_passthrough(response: reqwest::Response, start: Instant) -> Response {
    let status = response.status();
    let mut headers = response.headers().clone();
    sanitize_passthrough_headers(&mut headers);

    if let Some(range) = headers.get(header::CONTENT_RANGE) {
        debug!("Content-Range: {:?}", range);
    }

    let stream = response.bytes_stream().inspect(|chunk| {
        if let Ok(bytes) = chunk {
            metrics::record_bytes_streamed(bytes.len());
        }
    });

    let mut resp = Response::new(Body::from_stream(stream));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;

    metrics::record_request("passthrough", status.as_u16());
    metrics::record_duration("passthrough", start);

    resp
}

/// Drop origin headers that must not reach the player.
///
/// CORS headers are left to the router's `CorsLayer`, which overwrites
/// whatever the origin sent.
pub fn sanitize_passthrough_headers(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter().chain(EMBED_BLOCKING) {
        headers.remove(*name);
    }
}

/// The relay's own externally visible URL for this request, without query.
///
/// Rewritten playlist lines are `<relay_base>?url=<target>`. A configured
/// `PUBLIC_URL` wins; otherwise the forwarded or direct Host is used.
pub fn relay_base(config: &Config, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri.path();

    if let Some(public_url) = &config.public_url {
        return format!("{public_url}{path}");
    }

    let scheme = first_header_value(headers, "x-forwarded-proto")
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    let host = first_header_value(headers, "x-forwarded-host")
        .or_else(|| first_header_value(headers, "host"))
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    format!("{scheme}://{host}{path}")
}

/// First comma-separated element of a header, trimmed.
fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    if let Some(value) = headers.get(name)
        && let Ok(value) = value.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first);
        }
    }
    None
}
