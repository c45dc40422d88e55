//! Request classification.
//!
//! Decides which strategy answers a request. Pure: depends only on the
//! request's mode, destination and hostname.

use serde::{Deserialize, Serialize};

use crate::request::{Destination, Request, RequestMode};

/// Which handling strategy applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClassification {
    /// Full-page navigation; left to the network untouched.
    Excluded,
    /// Images and remote media; cache-first with fill.
    ImageLike,
    /// Markup, scripts, styles and everything else; stale-while-revalidate.
    Generic,
}

/// Classify `request`, treating any hostname containing `media_host` as image-like.
pub fn classify(request: &Request, media_host: &str) -> RequestClassification {
    if request.mode == RequestMode::Navigate {
        return RequestClassification::Excluded;
    }

    let on_media_host = !media_host.is_empty()
        && request
            .url
            .host_str()
            .is_some_and(|host| host.contains(media_host));

    if request.destination == Destination::Image || on_media_host {
        RequestClassification::ImageLike
    } else {
        RequestClassification::Generic
    }
}

/// Classifier bound to a configured media host.
#[derive(Debug, Clone)]
pub struct Classifier {
    media_host: String,
}

impl Classifier {
    pub fn new(media_host: impl Into<String>) -> Self {
        Self { media_host: media_host.into().to_ascii_lowercase() }
    }

    pub fn media_host(&self) -> &str {
        &self.media_host
    }

    pub fn classify(&self, request: &Request) -> RequestClassification {
        classify(request, &self.media_host)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MEDIA_HOST)
    }
}
