//! Request and response model shared by the store, classifier and strategies.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// How the page issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Full-page navigation.
    Navigate,
    SameOrigin,
    /// Subresource load without CORS (plain `<img>`, `<script>`).
    #[default]
    NoCors,
    Cors,
}

/// What the requested resource will be used as.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Video,
    /// `fetch()` and XHR.
    #[default]
    Empty,
    Other(String),
}

impl Destination {
    /// Parse a destination name as a browser reports it.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "image" => Self::Image,
            "script" => Self::Script,
            "style" => Self::Style,
            "font" => Self::Font,
            "video" => Self::Video,
            "" => Self::Empty,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Response tainting as seen by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response the page is allowed to read.
    Cors,
    /// Cross-origin response with an unreadable body.
    Opaque,
    Error,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "basic" => Some(Self::Basic),
            "cors" => Some(Self::Cors),
            "opaque" => Some(Self::Opaque),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Derive the response type a browser would assign to `request`
    /// when the page lives at `origin`.
    pub fn for_request(request: &Request, origin: &Url) -> Self {
        if request.url.origin() == origin.origin() {
            Self::Basic
        } else if request.mode == RequestMode::Cors {
            Self::Cors
        } else {
            Self::Opaque
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    /// A GET subresource request with default mode and destination.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".into(),
            url,
            mode: RequestMode::default(),
            destination: Destination::default(),
            headers: BTreeMap::new(),
        }
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate).with_destination(Destination::Document)
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// A response, either fresh from the network or replayed from the cache.
///
/// Cloning is the response duplicate: the body is reference counted, so the
/// copy written to the store is byte-identical to the one served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub response_type: ResponseType,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: Url, status: u16, response_type: ResponseType, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            status_text: String::new(),
            response_type,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Status in the 200-299 range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse("image"), Destination::Image);
        assert_eq!(Destination::parse("STYLE"), Destination::Style);
        assert_eq!(Destination::parse(""), Destination::Empty);
        assert_eq!(Destination::parse("audioworklet"), Destination::Other("audioworklet".into()));
    }

    #[test]
    fn test_response_type_for_request() {
        let origin = url("http://localhost:8080/");

        let same = Request::get(url("http://localhost:8080/style.css"));
        assert_eq!(ResponseType::for_request(&same, &origin), ResponseType::Basic);

        let cors = Request::get(url("https://res.cloudinary.com/a.jpg")).with_mode(RequestMode::Cors);
        assert_eq!(ResponseType::for_request(&cors, &origin), ResponseType::Cors);

        let opaque = Request::get(url("https://res.cloudinary.com/a.jpg"));
        assert_eq!(ResponseType::for_request(&opaque, &origin), ResponseType::Opaque);
    }

    #[test]
    fn test_response_type_parse_inverse() {
        for ty in [ResponseType::Basic, ResponseType::Cors, ResponseType::Opaque, ResponseType::Error] {
            assert_eq!(ResponseType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ResponseType::parse("opaqueredirect"), None);
    }

    #[test]
    fn test_navigate_request() {
        let req = Request::navigate(url("http://localhost:8080/video.html"));
        assert_eq!(req.mode, RequestMode::Navigate);
        assert_eq!(req.destination, Destination::Document);
        assert!(req.is_get());
    }

    #[test]
    fn test_with_method_uppercases() {
        let req = Request::get(url("http://localhost:8080/api")).with_method("post");
        assert_eq!(req.method, "POST");
        assert!(!req.is_get());
    }

    #[test]
    fn test_response_is_ok() {
        let ok = Response::new(url("http://localhost:8080/"), 204, ResponseType::Basic, "");
        let missing = Response::new(url("http://localhost:8080/"), 404, ResponseType::Basic, "");
        assert!(ok.is_ok());
        assert!(!missing.is_ok());
    }
}
