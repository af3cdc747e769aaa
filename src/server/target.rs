use crate::error::RelayError;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, info};
use url::{Host, Url};

/// File host whose `/u/<id>` share pages are HTML wrappers around the
/// raw file served at `/api/file/<id>`.
const PIXELDRAIN_HOST: &str = "pixeldrain.com";

/// Turn the raw `url` query parameter into the URL the relay will fetch.
///
/// Order matters: nothing here does I/O, and every rejection happens before
/// the origin is contacted.
///
/// # Errors
/// - [`RelayError::MissingUrl`] when the parameter is absent or blank
/// - [`RelayError::InvalidUrl`] when it is not an absolute http(s) URL
/// - [`RelayError::ForbiddenOrigin`] when `block_private` is set and the
///   host is a private or loopback address
pub fn resolve_target(raw: Option<&str>, block_private: bool) -> Result<Url, RelayError> {
    let raw = raw
        .filter(|s| !s.trim().is_empty())
        .ok_or(RelayError::MissingUrl)?;

    let mut url = Url::parse(raw).map_err(|e| RelayError::InvalidUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(RelayError::InvalidUrl(format!(
                "scheme '{scheme}' cannot be relayed"
            )));
        }
    }

    if url.host().is_none() {
        return Err(RelayError::InvalidUrl(format!("no host in {raw}")));
    }

    if block_private {
        check_public_host(&url)?;
    }

    if rewrite_known_host(&mut url) {
        info!("Rewrote share link to raw file URL: {}", url);
    }

    Ok(url)
}

/// Rewrite share-page paths of known file hosts to their raw-file API path.
///
/// Returns `true` if the URL was changed. Applied once; an already rewritten
/// URL no longer matches.
pub fn rewrite_known_host(url: &mut Url) -> bool {
    let on_pixeldrain = url.host_str().is_some_and(|host| {
        host.eq_ignore_ascii_case(PIXELDRAIN_HOST)
            || host.to_ascii_lowercase().ends_with(".pixeldrain.com")
    });
    if !on_pixeldrain {
        return false;
    }

    let Some(id) = url.path().strip_prefix("/u/").map(str::to_owned) else {
        return false;
    };

    debug!("pixeldrain share link for {}", id);
    url.set_path(&format!("/api/file/{id}"));
    true
}

/// Reject hosts that point into private address space.
///
/// **IP literals** are checked against blocked ranges; `localhost` is
/// rejected by name. Other hostnames are accepted without DNS resolution, so
/// DNS rebinding is not covered.
fn check_public_host(url: &Url) -> Result<(), RelayError> {
    match url.host() {
        Some(Host::Ipv4(ip)) if is_blocked_ipv4(ip) => Err(RelayError::ForbiddenOrigin(format!(
            "Private or reserved IPv4 address not allowed: {ip}"
        ))),
        Some(Host::Ipv6(ip)) if is_blocked_ipv6(ip) => Err(RelayError::ForbiddenOrigin(format!(
            "Private or reserved IPv6 address not allowed: {ip}"
        ))),
        Some(Host::Domain(name)) if name.eq_ignore_ascii_case("localhost") => Err(
            RelayError::ForbiddenOrigin("localhost is not allowed".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`     : "this" network (RFC 1122)
/// - `10.0.0.0/8`    : RFC 1918 private
/// - `127.0.0.0/8`   : loopback
/// - `169.254.0.0/16`: link-local / cloud-metadata
/// - `172.16.0.0/12` : RFC 1918 private
/// - `192.168.0.0/16`: RFC 1918 private
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

/// Returns `true` for IPv6 loopback, link-local (`fe80::/10`) and
/// unique-local (`fc00::/7`) addresses.
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();

    ip.is_loopback() || (s[0] & 0xffc0) == 0xfe80 || (s[0] & 0xfe00) == 0xfc00
}
