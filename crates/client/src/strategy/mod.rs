//! Strategy execution for intercepted requests.
//!
//! ### Cache-first with fill (image-like requests)
//! - A hit is returned without touching the network.
//! - A miss goes to the network; a 200 `basic`/`cors` response is stored
//!   before it is returned. Network failure yields no content.
//!
//! ### Stale-while-revalidate (everything else)
//! - The network refresh is spawned before the cache lookup, so both run
//!   concurrently.
//! - A hit is returned immediately; the refresh stores any 200 response
//!   in the background for the next load.
//! - A miss waits for the network. Network failure on a miss is an error.

mod cache_first;
mod stale_while_revalidate;

use std::sync::Arc;

use platypus_core::{CacheStore, Error, Request, RequestClassification, Response, ResponseType};
use tokio::task::JoinHandle;

use crate::fetch::Fetcher;
use crate::observe::{CacheEvent, CacheObserver, SkipReason, TracingObserver};

/// Where the returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Nothing was returned.
    None,
}

/// Background cache refresh started by stale-while-revalidate.
///
/// Dropping it detaches the refresh; it still runs to completion.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<()>,
}

impl Revalidation {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until the refresh, including its cache write, has completed.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "cache refresh task did not complete");
        }
    }
}

/// Outcome of executing a strategy.
#[derive(Debug)]
pub struct Served {
    pub response: Option<Response>,
    pub source: ResponseSource,
    /// Pending refresh, if one was started.
    pub revalidation: Option<Revalidation>,
}

impl Served {
    pub fn cached(response: Response) -> Self {
        Self { response: Some(response), source: ResponseSource::Cache, revalidation: None }
    }

    pub fn network(response: Response) -> Self {
        Self { response: Some(response), source: ResponseSource::Network, revalidation: None }
    }

    pub fn empty() -> Self {
        Self { response: None, source: ResponseSource::None, revalidation: None }
    }

    /// Wait for any pending refresh and return the served response.
    pub async fn settle(self) -> Option<Response> {
        if let Some(revalidation) = self.revalidation {
            revalidation.finish().await;
        }
        self.response
    }
}

/// Why the image strategy would refuse to store `response`, if it would.
pub fn image_skip_reason(request: &Request, response: &Response) -> Option<SkipReason> {
    if !request.is_get() {
        return Some(SkipReason::Method(request.method.clone()));
    }
    if response.status != 200 {
        return Some(SkipReason::Status(response.status));
    }
    match response.response_type {
        ResponseType::Basic | ResponseType::Cors => None,
        other => Some(SkipReason::ResponseType(other)),
    }
}

/// Why the generic strategy would refuse to store `response`, if it would.
///
/// Only the status matters here; opaque 200s are kept.
pub fn generic_skip_reason(request: &Request, response: &Response) -> Option<SkipReason> {
    if !request.is_get() {
        return Some(SkipReason::Method(request.method.clone()));
    }
    if response.status != 200 {
        return Some(SkipReason::Status(response.status));
    }
    None
}

/// Runs the caching strategies against the current namespace.
#[derive(Clone)]
pub struct StrategyExecutor {
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    observer: Arc<dyn CacheObserver>,
}

impl StrategyExecutor {
    pub fn new(store: CacheStore, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { store, fetcher, observer: Arc::new(TracingObserver) }
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Answer a request with the strategy matching its classification.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for `Excluded` requests, which must never be
    /// answered here, and the network error of a generic cache miss.
    pub async fn execute(&self, classification: RequestClassification, request: Request) -> Result<Served, Error> {
        match classification {
            RequestClassification::ImageLike => Ok(self.cache_first(&request).await),
            RequestClassification::Generic => self.stale_while_revalidate(request).await,
            RequestClassification::Excluded => {
                Err(Error::InvalidInput(format!("navigation to {} is not intercepted", request.url)))
            }
        }
    }

    fn emit(&self, event: CacheEvent) {
        self.observer.on_event(&event);
    }

    /// Look up the current namespace, treating unreadable entries as misses.
    async fn lookup(&self, request: &Request, classification: RequestClassification) -> Option<Response> {
        let found = match self.store.match_request(request).await {
            Ok(Some(cached)) => match cached.into_response() {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "ignoring unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
                None
            }
        };

        let url = request.url.clone();
        match found {
            Some(_) => self.emit(CacheEvent::Hit { url, classification }),
            None => self.emit(CacheEvent::Miss { url, classification }),
        }
        found
    }

    /// Best-effort write; failures are reported, never returned.
    async fn store_copy(&self, request: &Request, response: &Response, skip: Option<SkipReason>) {
        let url = request.url.clone();
        if let Some(reason) = skip {
            self.emit(CacheEvent::StoreSkipped { url, reason });
            return;
        }

        match self.store.put(request, response).await {
            Ok(()) => self.emit(CacheEvent::Stored { url, namespace: self.store.namespace().to_string() }),
            Err(e) => self.emit(CacheEvent::StoreFailed { url, error: e.to_string() }),
        }
    }
}
