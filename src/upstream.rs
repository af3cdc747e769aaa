//! Outbound side of the relay: header policy and the origin fetch.
//!
//! The relay never forwards the client's own identity. The outbound header
//! set is built from scratch out of three sources only: the inbound `Range`
//! header, the target's own origin (as `Origin` and `Referer`), and a
//! browser `User-Agent`.

use crate::error::{RelayError, Result};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use reqwest::{Client, Response};
use tracing::{debug, warn};
use url::Url;

/// Build the header set sent to the origin for `target`.
///
/// `target` must already be validated as an absolute http(s) URL; nothing in
/// here can fail for such a URL.
pub fn build_upstream_headers(
    target: &Url,
    inbound: &HeaderMap,
    user_agent: &HeaderValue,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(range) = inbound.get(header::RANGE) {
        debug!("Forwarding Range: {:?}", range);
        headers.insert(header::RANGE, range.clone());
    }

    // Many signed CDNs reject requests whose Referer is not same-origin.
    let origin = target.origin().ascii_serialization();
    match HeaderValue::from_str(&origin) {
        Ok(value) => {
            headers.insert(header::ORIGIN, value.clone());
            headers.insert(header::REFERER, value);
        }
        Err(e) => warn!("Cannot express origin {} as a header: {}", origin, e),
    }

    headers.insert(header::USER_AGENT, user_agent.clone());

    headers
}

/// Issue the single origin request for a relayed call.
///
/// Redirects are followed by the client's policy. There is no retry and no
/// timeout beyond what the transport itself enforces; a failure here ends
/// the request with a 502.
pub async fn fetch_origin(
    client: &Client,
    method: Method,
    target: &Url,
    headers: HeaderMap,
) -> Result<Response> {
    debug!("{} {} ({} headers)", method, target, headers.len());

    client
        .request(method, target.clone())
        .headers(headers)
        .send()
        .await
        .map_err(|e| {
            warn!("Origin fetch failed for {}: {}", target, e);
            RelayError::UpstreamFailed(e)
        })
}
