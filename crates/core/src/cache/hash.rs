//! Canonical request identity.

use sha2::{Digest, Sha256};
use url::Url;

/// Compute the cache key for a request: method plus URL without fragment.
pub fn compute_cache_key(method: &str, url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_url(url).as_bytes());
    hex::encode(hasher.finalize())
}

/// The URL as stored: host already lowercased by parsing, fragment removed.
pub fn canonical_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", &url("http://localhost:8080/style.css"));
        let hash2 = compute_cache_key("GET", &url("http://localhost:8080/style.css"));
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_ignores_fragment_and_host_case() {
        let plain = compute_cache_key("GET", &url("http://localhost:8080/index.html"));
        let noisy = compute_cache_key("get", &url("http://LOCALHOST:8080/index.html#films"));
        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", &url("http://localhost:8080/api"));
        let head = compute_cache_key("HEAD", &url("http://localhost:8080/api"));
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_keeps_query() {
        let a = compute_cache_key("GET", &url("https://res.cloudinary.com/a.jpg?w=400"));
        let b = compute_cache_key("GET", &url("https://res.cloudinary.com/a.jpg?w=800"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", &url("http://localhost:8080/"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
