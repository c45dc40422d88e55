//! URL canonicalization for user-supplied request targets.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a request target against the site origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Root-relative paths (`/style.css`) resolve against `origin`
/// 3. Default scheme to https:// for bare hosts
/// 4. Lowercase the host
/// 5. Remove fragment (#...)
/// 6. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str, origin: &url::Url) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = if trimmed.starts_with('/') && !trimmed.starts_with("//") {
        origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    } else {
        let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
        url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lower = host.to_lowercase();
        parsed
            .set_host(Some(&lower))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
