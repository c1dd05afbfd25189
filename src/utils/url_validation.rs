//! Endpoint URL validation
//!
//! Checks the provider endpoints from configuration before any connection
//! is attempted. The fallback endpoint is commonly a self-hosted CosyVoice
//! server on a private address, so private hosts are allowed here.

use thiserror::Error;
use url::Url;

/// Schemes accepted for the REST fallback endpoint
pub const HTTP_SCHEMES: &[&str] = &["http", "https"];

/// Schemes accepted for the streaming websocket endpoint
pub const WS_SCHEMES: &[&str] = &["ws", "wss"];

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be one of {allowed:?}, got: {scheme}")]
    UnsupportedScheme {
        scheme: String,
        allowed: Vec<String>,
    },

    #[error("URL must have a host")]
    MissingHost,
}

/// Validates an endpoint URL against a set of allowed schemes
///
/// # Arguments
/// * `url` - The URL string to validate
/// * `allowed_schemes` - Lowercase scheme names, e.g. [`HTTP_SCHEMES`]
///
/// # Returns
/// * `Ok(Url)` with the parsed URL
/// * `Err(UrlValidationError)` describing the first failed check
pub fn validate_endpoint_url(
    url: &str,
    allowed_schemes: &[&str],
) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url.trim())?;

    if !allowed_schemes.contains(&parsed.scheme()) {
        return Err(UrlValidationError::UnsupportedScheme {
            scheme: parsed.scheme().to_string(),
            allowed: allowed_schemes.iter().map(|s| s.to_string()).collect(),
        });
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(UrlValidationError::MissingHost),
    }
}
