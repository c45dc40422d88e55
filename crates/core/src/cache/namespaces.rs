//! Namespace lifecycle: create, list, promote, delete.
//!
//! A namespace is a versioned container of entries. Deleting one removes
//! its entries through the foreign key cascade.

use std::collections::BTreeSet;
use std::fmt;

use super::connection::CacheDb;
use super::entries::CacheStore;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Persisted lifecycle state of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceState {
    /// Opened, precache not yet complete.
    Installing,
    /// Manifest fully stored, waiting for activation.
    Installed,
    /// Current namespace serving requests.
    Active,
}

impl NamespaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Active => "active",
        }
    }

    fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "installing" => Ok(Self::Installing),
            "installed" => Ok(Self::Installed),
            "active" => Ok(Self::Active),
            other => Err(Error::CorruptEntry(format!("unknown namespace state: {other}"))),
        }
    }
}

impl fmt::Display for NamespaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary row for `CacheDb::list_namespaces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub state: NamespaceState,
    pub entries: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl CacheDb {
    /// Open a namespace, creating it if absent.
    ///
    /// Idempotent: an existing namespace keeps its state and entries, and
    /// every handle for the same name sees the same entries.
    pub async fn open_namespace(&self, name: &str) -> Result<CacheStore, Error> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("namespace name cannot be empty".into()));
        }

        let owned = name.to_string();
        let now = Utc::now().to_rfc3339();
        let created = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT INTO namespaces (name, state, created_at, updated_at)
                    VALUES (?1, 'installing', ?2, ?2)
                    ON CONFLICT(name) DO NOTHING",
                    params![owned, now],
                )?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)?;

        if created {
            tracing::debug!(namespace = name, "created cache namespace");
        }

        Ok(CacheStore::new(self.clone(), name.to_string()))
    }

    /// Whether a namespace with this name exists.
    pub async fn has_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM namespaces WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every namespace in the store.
    pub async fn namespace_names(&self) -> Result<BTreeSet<String>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM namespaces")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Every namespace with its state and entry count, oldest first.
    pub async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<NamespaceInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT n.name, n.state, COUNT(e.key_hash), n.created_at, n.updated_at
                    FROM namespaces n
                    LEFT JOIN entries e ON e.namespace = n.name
                    GROUP BY n.name
                    ORDER BY n.created_at ASC, n.name ASC",
                )?;

                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;

                rows.into_iter()
                    .map(|(name, state, entries, created_at, updated_at)| {
                        Ok(NamespaceInfo {
                            name,
                            state: NamespaceState::parse(&state)?,
                            entries: entries as u64,
                            created_at,
                            updated_at,
                        })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Current state of a namespace, or None if it doesn't exist.
    pub async fn namespace_state(&self, name: &str) -> Result<Option<NamespaceState>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Option<NamespaceState>, Error> {
                let result =
                    conn.query_row("SELECT state FROM namespaces WHERE name = ?1", params![name], |row| {
                        row.get::<_, String>(0)
                    });

                match result {
                    Ok(state) => Ok(Some(NamespaceState::parse(&state)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record a lifecycle transition for a namespace.
    ///
    /// Returns `Error::InvalidInput` if the namespace doesn't exist.
    pub async fn set_namespace_state(&self, name: &str, state: NamespaceState) -> Result<(), Error> {
        let owned = name.to_string();
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count = conn.execute(
                    "UPDATE namespaces SET state = ?2, updated_at = ?3 WHERE name = ?1",
                    params![owned, state.as_str(), now],
                )?;
                Ok(count)
            })
            .await
            .map_err(Error::from)?;

        if updated == 0 {
            return Err(Error::InvalidInput(format!("unknown namespace: {name}")));
        }
        Ok(())
    }

    /// Delete a namespace and all of its entries.
    ///
    /// Returns false if it did not exist.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let owned = name.to_string();
        let deleted = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![owned])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)?;

        if deleted {
            tracing::info!(namespace = name, "deleted cache namespace");
        }
        Ok(deleted)
    }
}
