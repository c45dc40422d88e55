//! Stale-while-revalidate.

use platypus_core::{Error, Request, RequestClassification, Response};
use tokio::sync::oneshot;

use super::{ResponseSource, Revalidation, Served, StrategyExecutor, generic_skip_reason};
use crate::observe::CacheEvent;

impl StrategyExecutor {
    /// Serve the cached copy at once and refresh it from the network.
    ///
    /// The refresh is spawned before the lookup so the fetch overlaps it,
    /// but its cache write waits until the lookup has read; a hit therefore
    /// always returns the copy that was cached before this request. On a
    /// miss the caller gets the network response as soon as it arrives,
    /// before the cache write.
    ///
    /// # Errors
    ///
    /// Returns the network error when there is no cached copy to fall back on.
    pub async fn stale_while_revalidate(&self, request: Request) -> Result<Served, Error> {
        let (tx, rx) = oneshot::channel();
        let (looked_up_tx, looked_up_rx) = oneshot::channel();
        let handle = tokio::spawn(self.clone().refresh(request.clone(), tx, looked_up_rx));
        let revalidation = Revalidation { handle };

        let cached = self.lookup(&request, RequestClassification::Generic).await;
        let _ = looked_up_tx.send(());

        if let Some(cached) = cached {
            return Ok(Served { response: Some(cached), source: ResponseSource::Cache, revalidation: Some(revalidation) });
        }

        match rx.await {
            Ok(Ok(response)) => {
                Ok(Served { response: Some(response), source: ResponseSource::Network, revalidation: Some(revalidation) })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Network(format!("{}: refresh ended without a response", request.url))),
        }
    }

    /// Fetch, hand the response to whoever is waiting, then store it once
    /// the lookup is done.
    async fn refresh(
        self,
        request: Request,
        tx: oneshot::Sender<Result<Response, Error>>,
        looked_up: oneshot::Receiver<()>,
    ) {
        let response = match self.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.emit(CacheEvent::NetworkFailed { url: request.url.clone(), error: e.to_string() });
                let _ = tx.send(Err(e));
                return;
            }
        };

        // A hit already returned, so nobody may be listening.
        let _ = tx.send(Ok(response.clone()));

        // Err means the caller went away; nothing left to protect.
        let _ = looked_up.await;

        let skip = generic_skip_reason(&request, &response);
        self.store_copy(&request, &response, skip).await;
    }
}
