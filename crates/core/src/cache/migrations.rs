//! Cache schema migrations.
//!
//! Each migration runs in its own transaction together with its
//! `_migrations` row. After migrating, the namespace and entry tables are
//! checked for every column the store reads, so a database written by an
//! unrelated tool is rejected at open time instead of on first lookup.

use tokio_rusqlite::{Connection, params, rusqlite};

use super::Error;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "namespaces", sql: include_str!("../../migrations/001_namespaces.sql") },
    Migration { version: 2, name: "entries", sql: include_str!("../../migrations/002_entries.sql") },
];

/// Columns the store depends on, per table.
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("namespaces", &["name", "state", "created_at", "updated_at"]),
    (
        "entries",
        &[
            "namespace",
            "key_hash",
            "method",
            "url",
            "status",
            "status_text",
            "response_type",
            "headers_json",
            "body",
            "cached_at",
        ],
    ),
];

/// Run pending migrations, then verify the resulting schema.
///
/// # Errors
///
/// `Error::MigrationFailed` if a migration does not apply or a required
/// column is missing afterwards.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::MigrationFailed(format!("v{} ({}): {e}", migration.version, migration.name)))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version = migration.version, name = migration.name, "applied cache migration");
        }

        verify_schema(conn)
    })
    .await
    .map_err(Error::from)
}

fn verify_schema(conn: &rusqlite::Connection) -> Result<(), Error> {
    for (table, required) in REQUIRED_COLUMNS {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        if columns.is_empty() {
            return Err(Error::MigrationFailed(format!("missing table {table}")));
        }
        if let Some(missing) = required.iter().find(|c| !columns.iter().any(|have| have.as_str() == **c)) {
            return Err(Error::MigrationFailed(format!("table {table} has no column {missing}")));
        }
    }
    Ok(())
}
