use axum::http::header;
use std::env;
use tower_http::cors;

/// Spoofed browser identity sent to every origin.
///
/// Some CDNs block requests whose User-Agent does not look like a desktop
/// browser, so the relay always presents one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Value of `Access-Control-Expose-Headers` on relayed responses
#[derive(Clone, Debug, PartialEq)]
pub enum ExposeHeaders {
    /// `*`: every response header is readable by the player
    Wildcard,
    /// Only the headers a ranged media fetch needs
    Strict,
}

impl ExposeHeaders {
    /// The matching `CorsLayer` setting.
    pub fn to_cors(&self) -> cors::ExposeHeaders {
        match self {
            ExposeHeaders::Wildcard => cors::ExposeHeaders::any(),
            ExposeHeaders::Strict => cors::ExposeHeaders::list([
                header::CONTENT_LENGTH,
                header::CONTENT_RANGE,
                header::ACCEPT_RANGES,
            ]),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Externally visible origin of the relay (e.g. `https://relay.example.com`).
    ///
    /// When unset, rewritten playlist links are built from the inbound
    /// `Host` and `X-Forwarded-Proto` headers.
    pub public_url: Option<String>,
    pub expose_headers: ExposeHeaders,
    /// User-Agent presented to origins
    pub user_agent: String,
    /// Reject IP-literal targets in private, loopback and link-local ranges
    pub block_private_origins: bool,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 3000 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let public_url = match env::var("PUBLIC_URL") {
            Ok(raw) if !raw.trim().is_empty() => {
                let parsed = url::Url::parse(raw.trim())
                    .map_err(|e| format!("PUBLIC_URL is not a valid URL: {e}"))?;
                Some(parsed.as_str().trim_end_matches('/').to_string())
            }
            _ => None,
        };

        let expose_headers = match env::var("EXPOSE_HEADERS")
            .unwrap_or_else(|_| "wildcard".to_string())
            .to_lowercase()
            .as_str()
        {
            "strict" => ExposeHeaders::Strict,
            _ => ExposeHeaders::Wildcard,
        };

        let user_agent = env::var("USER_AGENT")
            .ok()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        if axum::http::HeaderValue::from_str(&user_agent).is_err() {
            return Err("USER_AGENT contains characters not allowed in a header".into());
        }

        let block_private_origins = env::var("BLOCK_PRIVATE_ORIGINS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let metrics_enabled = env::var("METRICS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Config {
            port,
            is_dev,
            public_url,
            expose_headers,
            user_agent,
            block_private_origins,
            metrics_enabled,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            is_dev: true,
            public_url: None,
            expose_headers: ExposeHeaders::Wildcard,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            block_private_origins: false,
            metrics_enabled: false,
        }
    }
}
