//! Install and activation of a cache version.
//!
//! ### Install
//! - Opens the namespace named after the current version tag.
//! - Fetches every manifest resource concurrently. Any failure (transport
//!   error or non-2xx status) aborts the install and nothing is written.
//! - Writes all entries in one transaction and marks the namespace
//!   installed. An active namespace is never demoted. The new version does
//!   not wait for old pages to close.
//!
//! ### Activate
//! - Deletes every namespace except the current one.
//! - Marks the current namespace active and claims open pages in scope.

pub mod clients;

use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use platypus_core::{AppConfig, CacheDb, CacheStore, Error, Manifest, NamespaceState, Request, Response};
use url::Url;

pub use clients::{Client, ClientId, Clients};

use crate::fetch::Fetcher;

/// Where the controller is in the install/activate sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing attempted yet.
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    /// Last install failed; install may be retried.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub namespace: String,
    pub stored: usize,
    /// Activate immediately instead of waiting for old-version pages to close.
    pub skip_waiting: bool,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub namespace: String,
    /// Stale namespaces removed, sorted by name.
    pub deleted: Vec<String>,
    /// Open pages newly placed under this version's control.
    pub claimed: usize,
}

/// Drives one cache version through install and activation.
pub struct LifecycleController {
    db: CacheDb,
    version: String,
    origin: Url,
    manifest: Manifest,
    fetcher: Arc<dyn Fetcher>,
    clients: Clients,
    state: LifecycleState,
}

impl LifecycleController {
    pub fn new(db: CacheDb, version: impl Into<String>, origin: Url, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            db,
            version: version.into(),
            origin,
            manifest: Manifest::default(),
            fetcher,
            clients: Clients::new(),
            state: LifecycleState::Parsed,
        }
    }

    /// Build from loaded configuration.
    pub fn from_config(db: CacheDb, config: &AppConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let origin = config
            .site_origin()
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(db, config.cache_version.clone(), origin, fetcher))
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = clients;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Handle to the current namespace.
    pub async fn store(&self) -> Result<CacheStore, Error> {
        self.db.open_namespace(&self.version).await
    }

    /// Pick up where a previous process left off.
    ///
    /// An installed or active namespace for this version resumes in that
    /// state; anything else starts from `Parsed`.
    pub async fn restore(&mut self) -> Result<LifecycleState, Error> {
        self.state = match self.db.namespace_state(&self.version).await? {
            Some(NamespaceState::Installed) => LifecycleState::Installed,
            Some(NamespaceState::Active) => LifecycleState::Active,
            Some(NamespaceState::Installing) | None => LifecycleState::Parsed,
        };
        Ok(self.state)
    }

    /// Precache the manifest into this version's namespace.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` unless the controller is `Parsed` or
    /// `Redundant`; `Error::InstallFailed` if any manifest resource could
    /// not be fetched. A failed install leaves the controller `Redundant`;
    /// the namespace keeps the entries and state it had before.
    pub async fn install(&mut self) -> Result<InstallOutcome, Error> {
        if !matches!(self.state, LifecycleState::Parsed | LifecycleState::Redundant) {
            return Err(Error::InvalidState(format!("cannot install while {}", self.state)));
        }

        self.state = LifecycleState::Installing;
        tracing::info!(version = %self.version, resources = self.manifest.len(), "installing cache version");

        match self.precache().await {
            Ok(stored) => {
                self.state = LifecycleState::Installed;
                tracing::info!(version = %self.version, stored, "cache version installed");
                Ok(InstallOutcome { namespace: self.version.clone(), stored, skip_waiting: true })
            }
            Err(e) => {
                self.state = LifecycleState::Redundant;
                tracing::warn!(version = %self.version, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        // New namespaces start out `installing`; existing ones keep their
        // state until every resource is stored.
        let store = self.db.open_namespace(&self.version).await?;
        let previous = self.db.namespace_state(&self.version).await?;

        let urls = self.manifest.resolve(&self.origin)?;
        let pairs = try_join_all(urls.into_iter().map(|url| self.fetch_manifest_entry(url))).await?;

        store.put_all(&pairs).await?;
        if previous != Some(NamespaceState::Active) {
            self.db
                .set_namespace_state(&self.version, NamespaceState::Installed)
                .await?;
        }

        Ok(pairs.len())
    }

    async fn fetch_manifest_entry(&self, url: Url) -> Result<(Request, Response), Error> {
        let request = Request::get(url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed { url: request.url.to_string(), reason: e.to_string() })?;

        if !response.is_ok() {
            return Err(Error::InstallFailed {
                url: request.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        Ok((request, response))
    }

    /// Delete stale namespaces and take control of open pages.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` unless installed. A storage failure returns the
    /// controller to `Installed` so activation can be retried.
    pub async fn activate(&mut self) -> Result<ActivateOutcome, Error> {
        if self.state != LifecycleState::Installed {
            return Err(Error::InvalidState(format!("cannot activate while {}", self.state)));
        }

        self.state = LifecycleState::Activating;
        match self.cleanup().await {
            Ok(deleted) => {
                let claimed = self.clients.claim(&self.origin, &self.version).await;
                self.state = LifecycleState::Active;
                tracing::info!(version = %self.version, deleted = deleted.len(), claimed, "cache version active");
                Ok(ActivateOutcome { namespace: self.version.clone(), deleted, claimed })
            }
            Err(e) => {
                self.state = LifecycleState::Installed;
                tracing::warn!(version = %self.version, error = %e, "activation failed");
                Err(e)
            }
        }
    }

    async fn cleanup(&self) -> Result<Vec<String>, Error> {
        let stale: Vec<String> = self
            .db
            .namespace_names()
            .await?
            .into_iter()
            .filter(|name| *name != self.version)
            .collect();

        let removed = try_join_all(stale.iter().map(|name| self.db.delete_namespace(name))).await?;

        self.db
            .set_namespace_state(&self.version, NamespaceState::Active)
            .await?;

        Ok(stale
            .into_iter()
            .zip(removed)
            .filter_map(|(name, existed)| existed.then_some(name))
            .collect())
    }

    /// Install, then activate.
    pub async fn deploy(&mut self) -> Result<(InstallOutcome, ActivateOutcome), Error> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }
}
