//! Entry point for intercepted requests.

use platypus_core::{Classifier, Error, Request, RequestClassification};

use crate::strategy::{Served, StrategyExecutor};

/// What to do with an intercepted request.
#[derive(Debug)]
pub enum Intercept {
    /// Leave the request to the browser's default network handling.
    Passthrough(Request),
    Respond(Served),
}

/// Classifies requests and dispatches them to a strategy.
#[derive(Clone)]
pub struct Interceptor {
    classifier: Classifier,
    executor: StrategyExecutor,
}

impl Interceptor {
    pub fn new(classifier: Classifier, executor: StrategyExecutor) -> Self {
        Self { classifier, executor }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn executor(&self) -> &StrategyExecutor {
        &self.executor
    }

    /// Decide how to answer `request`.
    ///
    /// Navigations are handed back untouched so page loads always hit the
    /// network.
    pub async fn handle(&self, request: Request) -> Result<Intercept, Error> {
        let classification = self.classifier.classify(&request);
        tracing::debug!(url = %request.url, method = %request.method, ?classification, "intercepted request");

        if classification == RequestClassification::Excluded {
            return Ok(Intercept::Passthrough(request));
        }
        self.executor.execute(classification, request).await.map(Intercept::Respond)
    }

    /// Like [`handle`](Self::handle), but performs passthrough fetches too.
    pub async fn respond(&self, request: Request) -> Result<Served, Error> {
        match self.handle(request).await? {
            Intercept::Respond(served) => Ok(served),
            Intercept::Passthrough(request) => {
                let response = self.executor.fetcher().fetch(&request).await?;
                Ok(Served::network(response))
            }
        }
    }
}
