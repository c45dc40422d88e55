//! Request routing for platypus-sw.
//!
//! This crate provides the network fetcher, caching strategies, request
//! interception and the install/activate lifecycle built on top of the
//! store in `platypus-core`.

pub mod fetch;
pub mod intercept;
pub mod lifecycle;
pub mod observe;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Fetcher, UrlError, canonicalize};
pub use intercept::{Intercept, Interceptor};
pub use lifecycle::{
    ActivateOutcome, Client, ClientId, Clients, InstallOutcome, LifecycleController, LifecycleState,
};
pub use observe::{CacheEvent, CacheObserver, NoopObserver, SkipReason, TracingObserver};
pub use strategy::{ResponseSource, Revalidation, Served, StrategyExecutor};
