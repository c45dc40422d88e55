//! Entry operations within a single namespace.
//!
//! Entries are keyed by canonical request identity and always written as
//! whole rows, so concurrent puts for different keys never interfere and a
//! put for the same key is a plain replacement.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::hash::{canonical_url, compute_cache_key};
use crate::Error;
use crate::request::{Request, Response, ResponseType};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// A response captured in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub response_type: ResponseType,
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub body: Bytes,
    pub cached_at: String,
}

impl CachedResponse {
    /// Replay the captured response.
    pub fn into_response(self) -> Result<Response, Error> {
        let url = Url::parse(&self.url).map_err(|e| Error::CorruptEntry(format!("{}: {e}", self.url)))?;
        Ok(Response {
            url,
            status: self.status,
            status_text: self.status_text,
            response_type: self.response_type,
            headers: self.headers,
            body: self.body,
        })
    }
}

/// A row prepared outside the database thread.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: u16,
    status_text: String,
    response_type: &'static str,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(request: &Request, response: &Response) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(&response.headers)
            .map_err(|e| Error::InvalidInput(format!("unserializable headers: {e}")))?;
        Ok(Self {
            key_hash: compute_cache_key(&request.method, &request.url),
            method: request.method.clone(),
            url: canonical_url(&request.url),
            status: response.status,
            status_text: response.status_text.clone(),
            response_type: response.response_type.as_str(),
            headers_json,
            body: response.body.to_vec(),
        })
    }

    fn upsert(&self, conn: &rusqlite::Connection, namespace: &str, cached_at: &str) -> Result<(), Error> {
        conn.execute(
            "INSERT INTO entries (
                namespace, key_hash, method, url, status, status_text,
                response_type, headers_json, body, cached_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(namespace, key_hash) DO UPDATE SET
                method = excluded.method,
                url = excluded.url,
                status = excluded.status,
                status_text = excluded.status_text,
                response_type = excluded.response_type,
                headers_json = excluded.headers_json,
                body = excluded.body,
                cached_at = excluded.cached_at",
            params![
                namespace,
                &self.key_hash,
                &self.method,
                &self.url,
                self.status,
                &self.status_text,
                self.response_type,
                &self.headers_json,
                &self.body,
                cached_at,
            ],
        )?;
        Ok(())
    }
}

/// Handle to one namespace of the cache.
///
/// Cheap to clone; all handles share the underlying connection.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    namespace: String,
}

impl CacheStore {
    pub(crate) fn new(db: CacheDb, namespace: String) -> Self {
        Self { db, namespace }
    }

    /// Name of the namespace this handle points at.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The database this handle belongs to.
    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Look up a request.
    ///
    /// Returns None when nothing is stored; non-GET requests never match.
    pub async fn match_request(&self, request: &Request) -> Result<Option<CachedResponse>, Error> {
        if !request.is_get() {
            return Ok(None);
        }

        let namespace = self.namespace.clone();
        let key_hash = compute_cache_key(&request.method, &request.url);
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, method, url, status, status_text,
                        response_type, headers_json, body, cached_at
                    FROM entries WHERE namespace = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![namespace, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Vec<u8>>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                });

                let (key_hash, method, url, status, status_text, response_type, headers_json, body, cached_at) =
                    match result {
                        Ok(row) => row,
                        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    };

                let response_type = ResponseType::parse(&response_type)
                    .ok_or_else(|| Error::CorruptEntry(format!("unknown response type: {response_type}")))?;
                let headers = serde_json::from_str(&headers_json)
                    .map_err(|e| Error::CorruptEntry(format!("headers for {url}: {e}")))?;

                Ok(Some(CachedResponse {
                    key_hash,
                    method,
                    url,
                    status,
                    status_text,
                    response_type,
                    headers,
                    body: Bytes::from(body),
                    cached_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the entry for a request.
    ///
    /// Writes unconditionally; deciding whether a response is worth keeping
    /// is the caller's job.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        let row = EntryRow::new(request, response)?;
        let namespace = self.namespace.clone();
        let cached_at = Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> { row.upsert(conn, &namespace, &cached_at) })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace several entries in one transaction.
    ///
    /// Either every entry is written or none is.
    pub async fn put_all(&self, pairs: &[(Request, Response)]) -> Result<(), Error> {
        let rows = pairs
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, Error>>()?;
        let namespace = self.namespace.clone();
        let cached_at = Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for row in &rows {
                    row.upsert(&tx, &namespace, &cached_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry for a request. Returns false if there was none.
    pub async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let namespace = self.namespace.clone();
        let key_hash = compute_cache_key(&request.method, &request.url);
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE namespace = ?1 AND key_hash = ?2",
                    params![namespace, key_hash],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in this namespace, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let namespace = self.namespace.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE namespace = ?1 ORDER BY url ASC")?;
                let urls = stmt
                    .query_map(params![namespace], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in this namespace.
    pub async fn len(&self) -> Result<u64, Error> {
        let namespace = self.namespace.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE namespace = ?1", params![namespace], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NamespaceState;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn css_pair(body: &'static str) -> (Request, Response) {
        let u = url("http://localhost:8080/style.css");
        let response = Response::new(u.clone(), 200, ResponseType::Basic, body).with_header("Content-Type", "text/css");
        (Request::get(u), response)
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, response) = css_pair("body { color: teal }");

        store.put(&request, &response).await.unwrap();

        let cached = store.match_request(&request).await.unwrap().unwrap();
        assert_eq!(cached.status, 200);
        assert_eq!(cached.response_type, ResponseType::Basic);
        assert_eq!(cached.headers.get("content-type").map(String::as_str), Some("text/css"));
        assert_eq!(cached.into_response().unwrap(), response);
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, _) = css_pair("");
        assert!(store.match_request(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_ignores_fragment() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, response) = css_pair("a{}");
        store.put(&request, &response).await.unwrap();

        let with_fragment = Request::get(url("http://localhost:8080/style.css#top"));
        assert!(store.match_request(&with_fragment).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_non_get_never_matches() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, response) = css_pair("a{}");
        store.put(&request, &response).await.unwrap();

        let post = request.clone().with_method("POST");
        assert!(store.match_request(&post).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, old) = css_pair("old");
        let (_, new) = css_pair("new");

        store.put(&request, &old).await.unwrap();
        store.put(&request, &new).await.unwrap();

        let cached = store.match_request(&request).await.unwrap().unwrap();
        assert_eq!(cached.body, Bytes::from_static(b"new"));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_handles_share_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = db.open_namespace("platypus-cache-v4").await.unwrap();
        let second = db.open_namespace("platypus-cache-v4").await.unwrap();
        let (request, response) = css_pair("shared");

        first.put(&request, &response).await.unwrap();

        let cached = second.match_request(&request).await.unwrap().unwrap();
        assert_eq!(cached.body, response.body);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open_namespace("v1").await.unwrap();
        let v2 = db.open_namespace("v2").await.unwrap();
        let (request, response) = css_pair("v1 only");

        v1.put(&request, &response).await.unwrap();

        assert!(v2.match_request(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_all_and_keys() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let pairs: Vec<_> = ["/index.html", "/script.js"]
            .iter()
            .map(|path| {
                let u = url("http://localhost:8080").join(path).unwrap();
                (Request::get(u.clone()), Response::new(u, 200, ResponseType::Basic, *path))
            })
            .collect();

        store.put_all(&pairs).await.unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec!["http://localhost:8080/index.html", "http://localhost:8080/script.js"]
        );
    }

    #[tokio::test]
    async fn test_put_into_deleted_namespace_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        db.delete_namespace("v1").await.unwrap();

        let (request, response) = css_pair("orphan");
        let result = store.put(&request, &response).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_put_all_is_atomic() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        db.delete_namespace("v1").await.unwrap();

        let (request, response) = css_pair("a{}");
        let result = store.put_all(&[(request.clone(), response)]).await;
        assert!(result.is_err());

        let reopened = db.open_namespace("v1").await.unwrap();
        assert!(reopened.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, response) = css_pair("a{}");
        store.put(&request, &response).await.unwrap();

        assert!(store.delete(&request).await.unwrap());
        assert!(!store.delete(&request).await.unwrap());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_namespace_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        let (request, response) = css_pair("a{}");
        store.put(&request, &response).await.unwrap();

        db.delete_namespace("v1").await.unwrap();

        let reopened = db.open_namespace("v1").await.unwrap();
        assert!(reopened.match_request(&request).await.unwrap().is_none());
        assert_eq!(db.namespace_state("v1").await.unwrap(), Some(NamespaceState::Installing));
    }

    #[tokio::test]
    async fn test_list_namespaces_counts_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_namespace("v1").await.unwrap();
        db.open_namespace("v2").await.unwrap();
        let (request, response) = css_pair("a{}");
        store.put(&request, &response).await.unwrap();

        let list = db.list_namespaces().await.unwrap();
        let v1 = list.iter().find(|ns| ns.name == "v1").unwrap();
        let v2 = list.iter().find(|ns| ns.name == "v2").unwrap();
        assert_eq!(v1.entries, 1);
        assert_eq!(v2.entries, 0);
    }
}
