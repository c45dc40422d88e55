//! Open pages and which cache version controls them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use url::Url;

/// Identifier of an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// An open page.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    /// Version tag of the namespace governing this page's requests.
    pub controller: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, Client>>,
}

/// Registry of open pages.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Clients {
    inner: Arc<Inner>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page that was opened without a controller.
    pub async fn open(&self, url: Url) -> ClientId {
        let id = ClientId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner
            .clients
            .write()
            .await
            .insert(id, Client { id, url, controller: None });
        id
    }

    /// Forget a closed page. Returns false if it was unknown.
    pub async fn close(&self, id: ClientId) -> bool {
        self.inner.clients.write().await.remove(&id).is_some()
    }

    pub async fn get(&self, id: ClientId) -> Option<Client> {
        self.inner.clients.read().await.get(&id).cloned()
    }

    pub async fn controller(&self, id: ClientId) -> Option<String> {
        self.inner
            .clients
            .read()
            .await
            .get(&id)
            .and_then(|c| c.controller.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Take control of every page on `scope`'s origin.
    ///
    /// Returns how many pages changed controller.
    pub async fn claim(&self, scope: &Url, version: &str) -> usize {
        let mut clients = self.inner.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut() {
            if client.url.origin() != scope.origin() {
                continue;
            }
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let clients = Clients::new();
        let a = clients.open(url("http://localhost:8080/")).await;
        let b = clients.open(url("http://localhost:8080/video.html")).await;

        assert_ne!(a, b);
        assert_eq!(clients.len().await, 2);
        assert!(clients.close(a).await);
        assert!(!clients.close(a).await);
        assert!(clients.get(b).await.is_some());
    }

    #[tokio::test]
    async fn test_claim_in_scope_only() {
        let clients = Clients::new();
        let home = clients.open(url("http://localhost:8080/")).await;
        let other = clients.open(url("https://elsewhere.example/")).await;

        let claimed = clients.claim(&url("http://localhost:8080/"), "platypus-cache-v4").await;

        assert_eq!(claimed, 1);
        assert_eq!(clients.controller(home).await.as_deref(), Some("platypus-cache-v4"));
        assert_eq!(clients.controller(other).await, None);
    }

    #[tokio::test]
    async fn test_claim_replaces_old_controller() {
        let clients = Clients::new();
        let page = clients.open(url("http://localhost:8080/photo-studio.html")).await;
        let scope = url("http://localhost:8080/");

        assert_eq!(clients.claim(&scope, "platypus-cache-v3").await, 1);
        assert_eq!(clients.claim(&scope, "platypus-cache-v3").await, 0);
        assert_eq!(clients.claim(&scope, "platypus-cache-v4").await, 1);
        assert_eq!(clients.controller(page).await.as_deref(), Some("platypus-cache-v4"));
    }

    #[test]
    fn test_client_id_display() {
        assert_eq!(ClientId(7).to_string(), "client-7");
    }
}
