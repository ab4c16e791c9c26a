use std::collections::HashSet;

use axum::http::{HeaderValue, Method, header::CONTENT_DISPOSITION};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info};
use url::Url;

use crate::error::StartupError;

/// CORS layer for the configured origins, or `None` when the UI is only
/// served same-origin.
pub fn build_cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, StartupError> {
    if origins.is_empty() {
        info!("ALLOWED_ORIGINS is not set; cross-origin requests are not allowed.");
        return Ok(None);
    }

    let mut allowed = HashSet::with_capacity(origins.len());
    for origin in origins {
        let normalized =
            normalize_origin(origin).ok_or_else(|| StartupError::InvalidOrigin(origin.clone()))?;
        allowed.insert(normalized);
    }
    info!("Accepting cross-origin requests from {:?}", allowed);

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin_is_allowed(&allowed, origin)
            }))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers([CONTENT_DISPOSITION]),
    ))
}

fn origin_is_allowed(allowed: &HashSet<String>, origin: &HeaderValue) -> bool {
    let Some(normalized) = origin.to_str().ok().and_then(normalize_origin) else {
        debug!("Rejected malformed Origin header {:?}", origin);
        return false;
    };
    let permitted = allowed.contains(&normalized);
    if !permitted {
        debug!("Rejected cross-origin request from {normalized}");
    }
    permitted
}

/// Reduces an origin to `scheme://host[:port]`. Only bare http(s) origins
/// qualify.
pub fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let bare = parsed.path() == "/" && parsed.query().is_none() && parsed.fragment().is_none();
    if !bare || !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?;
    // `Url::port` is `None` for the scheme's default port.
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}
