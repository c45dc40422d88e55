//! platypus-sw command line entry point.
//!
//! Drives the cache lifecycle and pushes single requests through the
//! interceptor against a local SQLite store. Logging goes to stderr so
//! command output on stdout stays machine readable.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use platypus_client::{
    FetchClient, FetchConfig, Fetcher, Interceptor, LifecycleController, StrategyExecutor, canonicalize,
};
use platypus_core::{AppConfig, CacheDb, Classifier, Destination, Request, RequestMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline cache engine for the platypus site", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Precache the manifest into the current version's namespace
    Install,

    /// Delete stale namespaces and activate the current version
    Activate,

    /// Install, then activate
    Deploy,

    /// Answer one request through the interceptor
    Fetch {
        /// Absolute URL or site path
        url: String,

        /// Request destination (document, image, script, style, font, video)
        #[arg(short, long)]
        destination: Option<String>,

        /// Send as a top-level navigation
        #[arg(long)]
        navigate: bool,

        /// Use cors mode for cross-origin requests
        #[arg(long)]
        cors: bool,
    },

    /// List cache namespaces as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::debug!(db_path = %config.db_path.display(), version = %config.cache_version, "configuration loaded");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open cache at {}", config.db_path.display()))?;

    match args.command {
        Command::Install => {
            let mut controller = controller(db, &config).await?;
            let outcome = controller.install().await?;
            println!("installed {} entries into {}", outcome.stored, outcome.namespace);
        }
        Command::Activate => {
            let mut controller = controller(db, &config).await?;
            let outcome = controller.activate().await?;
            println!(
                "activated {} (deleted: [{}], claimed: {})",
                outcome.namespace,
                outcome.deleted.join(", "),
                outcome.claimed
            );
        }
        Command::Deploy => {
            let mut controller = controller(db, &config).await?;
            let (installed, activated) = controller.deploy().await?;
            println!(
                "deployed {} with {} entries (deleted: [{}])",
                installed.namespace,
                installed.stored,
                activated.deleted.join(", ")
            );
        }
        Command::Fetch { url, destination, navigate, cors } => {
            let origin = config.site_origin()?;
            let url = canonicalize(&url, &origin)?;

            let mut request = if navigate { Request::navigate(url) } else { Request::get(url) };
            if let Some(destination) = destination {
                request = request.with_destination(Destination::parse(&destination));
            }
            if cors && !navigate {
                request = request.with_mode(RequestMode::Cors);
            }

            let store = db.open_namespace(&config.cache_version).await?;
            let executor = StrategyExecutor::new(store, fetcher(&config)?);
            let interceptor = Interceptor::new(Classifier::new(config.media_host.clone()), executor);

            let served = interceptor.respond(request).await?;
            let source = served.source;
            match served.settle().await {
                Some(response) => println!(
                    "{} {} ({:?}, {}, {} bytes)",
                    response.status,
                    response.url,
                    source,
                    response.response_type,
                    response.body.len()
                ),
                None => println!("no response ({source:?})"),
            }
        }
        Command::Status => {
            let namespaces = db.list_namespaces().await?;
            println!("{}", serde_json::to_string_pretty(&namespaces)?);
        }
    }

    Ok(())
}

fn fetcher(config: &AppConfig) -> Result<Arc<dyn Fetcher>> {
    let client = FetchClient::new(FetchConfig::from_app_config(config)?)?;
    Ok(Arc::new(client))
}

/// Controller for the configured version, resumed from the persisted state.
///
/// An already installed or active version is never reinstalled over.
async fn controller(db: CacheDb, config: &AppConfig) -> Result<LifecycleController> {
    let mut controller = LifecycleController::from_config(db, config, fetcher(config)?)?;
    let state = controller.restore().await?;
    tracing::debug!(version = %config.cache_version, %state, "restored lifecycle state");
    Ok(controller)
}

#[cfg(test)]
mod tests {
    use platypus_client::LifecycleState;
    use platypus_core::NamespaceState;

    use super::*;

    #[test]
    fn test_fetcher_from_default_config() {
        assert!(fetcher(&AppConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_controller_starts_fresh_version_parsed() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let controller = controller(db, &AppConfig::default()).await.unwrap();
        assert_eq!(controller.state(), LifecycleState::Parsed);
    }

    #[tokio::test]
    async fn test_controller_refuses_reinstall_of_active_version() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig::default();
        db.open_namespace(&config.cache_version).await.unwrap();
        db.set_namespace_state(&config.cache_version, NamespaceState::Active).await.unwrap();

        let mut controller = controller(db.clone(), &config).await.unwrap();
        assert_eq!(controller.state(), LifecycleState::Active);

        let err = controller.install().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(db.namespace_state(&config.cache_version).await.unwrap(), Some(NamespaceState::Active));
    }
}
