//! Cache-first with fill.

use platypus_core::{Request, RequestClassification};

use super::{Served, StrategyExecutor, image_skip_reason};
use crate::observe::CacheEvent;

impl StrategyExecutor {
    /// Serve from cache, falling back to the network on a miss.
    ///
    /// Cached images are never revalidated; only a namespace bump replaces
    /// them. Network failure returns no response rather than an error.
    pub async fn cache_first(&self, request: &Request) -> Served {
        if let Some(cached) = self.lookup(request, RequestClassification::ImageLike).await {
            return Served::cached(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let skip = image_skip_reason(request, &response);
                self.store_copy(request, &response, skip).await;
                Served::network(response)
            }
            Err(e) => {
                self.emit(CacheEvent::NetworkFailed { url: request.url.clone(), error: e.to_string() });
                Served::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use platypus_core::{CacheDb, Destination, RequestMode, Response, ResponseType};

    use super::*;
    use crate::observe::SkipReason;
    use crate::strategy::ResponseSource;
    use crate::testing::{MockFetcher, RecordingObserver, site};

    async fn executor(fetcher: Arc<MockFetcher>) -> (StrategyExecutor, Arc<RecordingObserver>) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("platypus-cache-v4").await.unwrap();
        let observer = Arc::new(RecordingObserver::default());
        (StrategyExecutor::new(store, fetcher).with_observer(observer.clone()), observer)
    }

    fn image(url: url::Url) -> Request {
        Request::get(url).with_destination(Destination::Image)
    }

    #[tokio::test]
    async fn test_hit_makes_no_network_call() {
        let fetcher = Arc::new(MockFetcher::new());
        let (executor, _) = executor(fetcher.clone()).await;
        let request = image(site("/assets/platypus.png"));
        let cached = Response::new(site("/assets/platypus.png"), 200, ResponseType::Basic, "cached png");
        executor.store().put(&request, &cached).await.unwrap();

        let served = executor.cache_first(&request).await;

        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response, Some(cached));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_miss_fills_cache_with_served_body() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = site("/assets/logo.png");
        fetcher.respond(&url, 200, "logo bytes");
        let (executor, observer) = executor(fetcher.clone()).await;
        let request = image(url);

        let served = executor.cache_first(&request).await;

        let response = served.response.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        let stored = executor.store().match_request(&request).await.unwrap().unwrap();
        assert_eq!(stored.body, response.body);
        assert!(observer.events().iter().any(|e| matches!(e, CacheEvent::Stored { .. })));
    }

    #[tokio::test]
    async fn test_second_request_served_from_fill() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = site("/assets/logo.png");
        fetcher.respond(&url, 200, "logo bytes");
        let (executor, _) = executor(fetcher.clone()).await;
        let request = image(url);

        executor.cache_first(&request).await;
        let second = executor.cache_first(&request).await;

        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_returns_nothing() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = site("/assets/missing.png");
        fetcher.fail(&url);
        let (executor, observer) = executor(fetcher.clone()).await;
        let request = image(url);

        let served = executor.cache_first(&request).await;

        assert_eq!(served.source, ResponseSource::None);
        assert!(served.response.is_none());
        assert!(executor.store().is_empty().await.unwrap());
        assert!(observer.events().iter().any(|e| matches!(e, CacheEvent::NetworkFailed { .. })));
    }

    #[tokio::test]
    async fn test_error_status_returned_but_not_stored() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = site("/assets/gone.png");
        fetcher.respond(&url, 404, "not found");
        let (executor, observer) = executor(fetcher.clone()).await;
        let request = image(url);

        let served = executor.cache_first(&request).await;

        assert_eq!(served.response.map(|r| r.status), Some(404));
        assert!(executor.store().is_empty().await.unwrap());
        assert!(
            observer
                .events()
                .contains(&CacheEvent::StoreSkipped { url: request.url.clone(), reason: SkipReason::Status(404) })
        );
    }

    #[tokio::test]
    async fn test_opaque_media_response_not_stored() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = url::Url::parse("https://res.cloudinary.com/platypus/image/upload/still.jpg").unwrap();
        fetcher.respond(&url, 200, "jpeg");
        let (executor, _) = executor(fetcher.clone()).await;
        let request = image(url);

        let served = executor.cache_first(&request).await;

        assert_eq!(served.response.map(|r| r.response_type), Some(ResponseType::Opaque));
        assert!(executor.store().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_cors_media_response_stored() {
        let fetcher = Arc::new(MockFetcher::new());
        let url = url::Url::parse("https://res.cloudinary.com/platypus/image/upload/still.jpg").unwrap();
        fetcher.respond(&url, 200, "jpeg");
        let (executor, _) = executor(fetcher.clone()).await;
        let request = image(url).with_mode(RequestMode::Cors);

        executor.cache_first(&request).await;

        assert_eq!(executor.store().len().await.unwrap(), 1);
    }
}
