//! Core types and shared functionality for the platypus cache engine.
//!
//! This crate provides:
//! - Namespaced cache store with SQLite backend
//! - Request/response model and request classification
//! - The precache manifest
//! - Unified error types and configuration

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod manifest;
pub mod request;

pub use cache::{CacheDb, CacheStore, CachedResponse, NamespaceInfo, NamespaceState};
pub use classify::{Classifier, RequestClassification, classify};
pub use config::AppConfig;
pub use error::Error;
pub use manifest::{Manifest, PRECACHE_PATHS};
pub use request::{Destination, Request, RequestMode, Response, ResponseType};
