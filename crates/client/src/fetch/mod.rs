//! Network access for the engine.
//!
//! ### Fetcher seam
//! - Strategies and the lifecycle controller only see the `Fetcher` trait,
//!   so tests substitute a scripted network.
//!
//! ### HTTP client
//! - reqwest with rustls, compression, redirect and body size limits.
//! - Non-2xx statuses are responses, not errors; only transport failures
//!   (offline, DNS, timeout) are errors.
//! - The response type is derived from the request the way a browser
//!   taints it: same-origin is `basic`, CORS-mode cross-origin is `cors`,
//!   anything else cross-origin is `opaque`.

pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use platypus_core::{AppConfig, Error, Request, Response, ResponseType};
use reqwest::{Client, Method, header};

pub use self::url::{UrlError, canonicalize};

/// Performs network requests on behalf of the engine.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue `request` and return whatever the server answered.
    ///
    /// Errors only when no response was obtained.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin of the site; decides basic vs cors/opaque tainting.
    pub origin: ::url::Url,

    /// User agent string (default: "platypus-sw/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 20MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            origin: ::url::Url::parse("http://localhost:8080/").expect("static origin is valid"),
            user_agent: "platypus-sw/0.1".to_string(),
            max_bytes: 20 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    /// Build from the loaded application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config
            .site_origin()
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            origin,
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        })
    }
}

/// reqwest-backed `Fetcher`.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn transport_error(&self, request: &Request, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::FetchTimeout(format!("{} after {:?}", request.url, self.config.timeout))
        } else if err.is_builder() {
            Error::HttpError(format!("invalid request for {}: {}", request.url, err))
        } else {
            Error::Network(format!("{}: {}", request.url, err))
        }
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(request, e))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers = collect_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(request, e))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            fetch_ms,
            body.len()
        );

        Ok(Response {
            url: final_url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            response_type: ResponseType::for_request(request, &self.config.origin),
            headers,
            body,
        })
    }
}

/// Flatten a header map, joining repeated headers with ", ".
fn collect_headers(map: &header::HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}
