//! Observability hook for cache decisions.
//!
//! Strategies never surface a skipped or failed store to the caller. They
//! report it here instead, so a deployment can count or log them without
//! changing what the page sees.

use platypus_core::{RequestClassification, ResponseType};
use url::Url;

/// Why a network response was not written to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Status other than 200.
    Status(u16),
    /// Response type the strategy refuses to keep (opaque, error).
    ResponseType(ResponseType),
    /// Only GET requests are cached.
    Method(String),
}

/// A single cache decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Hit { url: Url, classification: RequestClassification },
    Miss { url: Url, classification: RequestClassification },
    Stored { url: Url, namespace: String },
    StoreSkipped { url: Url, reason: SkipReason },
    StoreFailed { url: Url, error: String },
    NetworkFailed { url: Url, error: String },
}

impl CacheEvent {
    pub fn url(&self) -> &Url {
        match self {
            CacheEvent::Hit { url, .. }
            | CacheEvent::Miss { url, .. }
            | CacheEvent::Stored { url, .. }
            | CacheEvent::StoreSkipped { url, .. }
            | CacheEvent::StoreFailed { url, .. }
            | CacheEvent::NetworkFailed { url, .. } => url,
        }
    }
}

/// Receives every cache decision made by the strategy executor.
pub trait CacheObserver: Send + Sync {
    fn on_event(&self, event: &CacheEvent) {
        let _ = event;
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}

/// Forwards events to `tracing`; failures at warn, the rest at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn on_event(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { url, classification } => {
                tracing::debug!(%url, ?classification, "cache hit");
            }
            CacheEvent::Miss { url, classification } => {
                tracing::debug!(%url, ?classification, "cache miss");
            }
            CacheEvent::Stored { url, namespace } => {
                tracing::debug!(%url, namespace = namespace.as_str(), "stored response");
            }
            CacheEvent::StoreSkipped { url, reason } => {
                tracing::debug!(%url, ?reason, "response not cacheable");
            }
            CacheEvent::StoreFailed { url, error } => {
                tracing::warn!(%url, error = error.as_str(), "failed to store response");
            }
            CacheEvent::NetworkFailed { url, error } => {
                tracing::warn!(%url, error = error.as_str(), "network request failed");
            }
        }
    }
}
