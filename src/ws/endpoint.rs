//! Endpoint validation

use super::types::{ManagerConfig, WsError};
use url::{Host, Url};

const INSECURE_PREFIX: &str = "ws://";
const SECURE_PREFIX: &str = "wss://";

/// Normalize and validate a WebSocket endpoint.
///
/// In a secure context a `ws://` URL is upgraded to `wss://`. The result must
/// use the `wss` scheme unless the config allows plain `ws` to a loopback host.
pub fn normalize(raw: &str, config: &ManagerConfig) -> Result<String, WsError> {
    let url = if config.secure_context && raw.starts_with(INSECURE_PREFIX) {
        format!("{}{}", SECURE_PREFIX, &raw[INSECURE_PREFIX.len()..])
    } else {
        raw.to_string()
    };

    let invalid = |reason: String| WsError::InvalidUrl {
        url: url.clone(),
        reason,
    };

    if url.is_empty() {
        return Err(invalid("URL is empty".to_string()));
    }

    let parsed = Url::parse(&url).map_err(|e| invalid(e.to_string()))?;

    if parsed.host().is_none() {
        return Err(invalid("URL has no host".to_string()));
    }

    match parsed.scheme() {
        "wss" => Ok(url),
        "ws" if config.allow_insecure_localhost && is_loopback(&parsed) => {
            tracing::debug!(url = %url, "Allowing insecure WebSocket URL for local development");
            Ok(url)
        }
        other => Err(invalid(format!("scheme must be wss://, got {}://", other))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}
