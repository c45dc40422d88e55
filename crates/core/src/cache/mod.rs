//! SQLite-backed, namespaced response cache.
//!
//! This module provides the durable store behind the engine using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Versioned namespaces with whole-namespace deletion
//! - Entries keyed by SHA-256 of method and canonical URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod namespaces;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheStore, CachedResponse};
pub use namespaces::{NamespaceInfo, NamespaceState};
