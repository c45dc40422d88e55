//! Scripted network and recording observer for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use platypus_core::{Error, Request, Response, ResponseType};
use tokio::sync::Semaphore;
use url::Url;

use crate::fetch::Fetcher;
use crate::observe::{CacheEvent, CacheObserver};

pub(crate) const ORIGIN: &str = "http://localhost:8080";

pub(crate) fn site(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

#[derive(Clone)]
enum Route {
    Respond { status: u16, body: Vec<u8> },
    Fail,
}

/// Network double: answers from a route table and records every request.
pub(crate) struct MockFetcher {
    origin: Url,
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<Request>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self {
            origin: Url::parse(ORIGIN).unwrap(),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Hold every response until a permit is added to the returned semaphore.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: Some(gate.clone()), ..Self::new() }, gate)
    }

    pub(crate) fn respond(&self, url: &Url, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Respond { status, body: body.as_bytes().to_vec() });
    }

    pub(crate) fn fail(&self, url: &Url) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    pub(crate) fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        match route {
            Some(Route::Respond { status, body }) => {
                let response_type = ResponseType::for_request(request, &self.origin);
                Ok(Response::new(request.url.clone(), status, response_type, body))
            }
            Some(Route::Fail) => Err(Error::Network(format!("{}: connection refused", request.url))),
            None => Err(Error::Network(format!("{}: no route", request.url))),
        }
    }
}

/// Observer that keeps every event for assertions.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<CacheEvent>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<CacheEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CacheObserver for RecordingObserver {
    fn on_event(&self, event: &CacheEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
