//! Request/response operations: server checks, database lifecycle, documents.
//!
//! Every operation builds a URL from the [`Database`], issues one request
//! through its `reqwest` client and decodes the JSON reply. Only plain reads
//! (`unmarshal_url`) are retried.
//!
//! ```ignore
//! use couchdb_http::Database;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> couchdb_http::Result<()> {
//!     let db = Database::open("localhost", 5984, "notes").await?;
//!     let (id, rev) = db.insert(&json!({"title": "hello"})).await?;
//!     let note: serde_json::Value = db.retrieve(&id).await?;
//!     db.delete(&id, &rev).await?;
//!     Ok(())
//! }
//! ```

use super::database::Database;
use super::utils::{exponential_backoff, strip_etag};
use crate::error::{CouchError, Result};
use crate::protocol::constants::paths;
use crate::types::{DbInfo, DocResponse, IdAndRev};
use http::header::{CONTENT_TYPE, ETAG, IF_MATCH};
use http::{HeaderName, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::sleep;
use url::Url;

fn status_error(status: StatusCode) -> CouchError {
    CouchError::Status {
        status: status.as_u16(),
        message: status.to_string(),
    }
}

#[derive(Serialize)]
struct BulkDocs<'a, T> {
    docs: &'a [T],
}

fn check_ok(response: DocResponse) -> Result<DocResponse> {
    if response.ok {
        Ok(response)
    } else {
        Err(CouchError::Rejected {
            error: response.error,
            reason: response.reason,
        })
    }
}

/// Serialize `doc` and split off its `_id` and `_rev`.
pub(crate) fn clean_json<T: Serialize + ?Sized>(
    doc: &T,
) -> Result<(Map<String, Value>, Option<String>, Option<String>)> {
    let mut map = match serde_json::to_value(doc)? {
        Value::Object(map) => map,
        other => {
            return Err(CouchError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };
    let mut take = |key: &str| -> Result<Option<String>> {
        match map.remove(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(CouchError::InvalidDocument(format!(
                "{} must be a string, got {}",
                key, other
            ))),
        }
    };
    let id = take("_id")?;
    let rev = take("_rev")?;
    Ok((map, id, rev))
}

impl Database {
    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }

    /// Send a request with an optional JSON body and decode the reply.
    pub(crate) async fn interact<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        headers: &[(HeaderName, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<(u16, T)> {
        let mut req_builder = self.request(method, url);
        for (name, value) in headers {
            req_builder = req_builder.header(name, *value);
        }
        if let Some(body) = body {
            req_builder = req_builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = req_builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        let out = response.json::<T>().await?;
        Ok((status.as_u16(), out))
    }

    /// `GET` `url` and decode the reply, retrying transient failures.
    pub(crate) async fn unmarshal_url<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.unmarshal_once(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = exponential_backoff(attempt, self.config.retry_delay_ms);
                    if self.config.enable_logging {
                        tracing::warn!(
                            "Request failed (attempt {}), retrying after {:?}: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn unmarshal_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let response = self.request(Method::GET, url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            return Err(status_error(response.status()));
        }
        Ok(response.json::<T>().await?)
    }

    /// Whether the server answers `/_all_dbs` with at least one database.
    /// Ignores [`name`](Database::name).
    pub async fn running(&self) -> bool {
        let Ok(url) = self.server_endpoint(&[paths::ALL_DBS]) else {
            return false;
        };
        match self.unmarshal_url::<Vec<String>>(url).await {
            Ok(dbs) => !dbs.is_empty(),
            Err(e) => {
                tracing::debug!("Server check failed: {}", e);
                false
            }
        }
    }

    /// Whether this database exists on the server.
    pub async fn exists(&self) -> bool {
        match self.get_info().await {
            Ok(info) => info.name == self.name,
            Err(_) => false,
        }
    }

    pub(crate) async fn create_database(&self) -> Result<()> {
        let url = self.endpoint(&[])?;
        let (_, response) = self.interact::<DocResponse>(Method::PUT, url, &[], None).await?;
        check_ok(response).map(|_| ())
    }

    /// Delete this database and all its documents.
    pub async fn delete_database(&self) -> Result<()> {
        let url = self.endpoint(&[])?;
        let (_, response) = self.interact::<DocResponse>(Method::DELETE, url, &[], None).await?;
        check_ok(response).map(|_| ())
    }

    /// Database metadata.
    pub async fn get_info(&self) -> Result<DbInfo> {
        self.unmarshal_url(self.endpoint(&[])?).await
    }

    /// Insert, update or delete many documents in one request.
    ///
    /// `_id` and `_rev` are honored; add `"_deleted": true` with a valid
    /// `_rev` to delete. Per-document failures are reported in the results,
    /// not as an error.
    pub async fn bulk<T: Serialize>(&self, docs: &[T]) -> Result<Vec<DocResponse>> {
        let body = serde_json::to_vec(&BulkDocs { docs })?;
        let url = self.endpoint(&[paths::BULK_DOCS])?;
        let (_, results) = self.interact(Method::POST, url, &[], Some(body)).await?;
        Ok(results)
    }

    /// Insert a document, returning its id and revision.
    ///
    /// With both `_id` and `_rev` the document is updated, with only `_id`
    /// it is created under that id, and otherwise the server picks an id.
    pub async fn insert<T: Serialize + ?Sized>(&self, doc: &T) -> Result<(String, String)> {
        let (body, id, rev) = clean_json(doc)?;
        match (id, rev) {
            (Some(id), Some(rev)) if !id.is_empty() && !rev.is_empty() => {
                let new_rev = self.edit(doc).await?;
                Ok((id, new_rev))
            }
            (Some(id), _) if !id.is_empty() => {
                self.insert_body(Method::PUT, self.endpoint(&[id.as_str()])?, &body).await
            }
            _ => self.insert_body(Method::POST, self.endpoint(&[])?, &body).await,
        }
    }

    /// Create `doc` under `id`; fails if the id is taken.
    ///
    /// `doc` should not carry `_id` or `_rev`.
    pub async fn insert_with<T: Serialize + ?Sized>(&self, doc: &T, id: &str) -> Result<(String, String)> {
        let body = serde_json::to_value(doc)?;
        self.insert_body(Method::PUT, self.endpoint(&[id])?, &body).await
    }

    async fn insert_body<B: Serialize + ?Sized>(&self, method: Method, url: Url, body: &B) -> Result<(String, String)> {
        let body = serde_json::to_vec(body)?;
        let (_, response) = self.interact::<DocResponse>(method, url, &[], Some(body)).await?;
        let response = check_ok(response)?;
        Ok((response.id, response.rev))
    }

    /// Update a document carrying `_id` and `_rev`, returning the new revision.
    pub async fn edit<T: Serialize + ?Sized>(&self, doc: &T) -> Result<String> {
        let body = serde_json::to_value(doc)?;
        let id_rev: IdAndRev = serde_json::from_value(body.clone())
            .map_err(|e| CouchError::InvalidDocument(e.to_string()))?;
        if id_rev.id.is_empty() {
            return Err(CouchError::InvalidDocument("_id not specified".to_string()));
        }
        if id_rev.rev.is_empty() {
            return Err(CouchError::InvalidDocument(
                "_rev not specified (try insert_with)".to_string(),
            ));
        }
        let url = self.endpoint(&[id_rev.id.as_str()])?;
        let body = serde_json::to_vec(&body)?;
        let (_, response) = self.interact::<DocResponse>(Method::PUT, url, &[], Some(body)).await?;
        Ok(check_ok(response)?.rev)
    }

    /// Update `doc` as revision `rev` of `id`, returning the new revision.
    ///
    /// `_id` and `_rev` in `doc` are overwritten.
    pub async fn edit_with<T: Serialize + ?Sized>(&self, doc: &T, id: &str, rev: &str) -> Result<String> {
        if id.is_empty() || rev.is_empty() {
            return Err(CouchError::InvalidDocument(
                "edit_with needs both id and rev".to_string(),
            ));
        }
        let (mut map, _, _) = clean_json(doc)?;
        map.insert("_id".to_string(), Value::from(id));
        map.insert("_rev".to_string(), Value::from(rev));
        self.edit(&map).await
    }

    /// Fetch and decode the document `id`.
    pub async fn retrieve<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        if id.is_empty() {
            return Err(CouchError::InvalidDocument("no id specified".to_string()));
        }
        self.unmarshal_url(self.endpoint(&[id])?).await
    }

    /// Delete revision `rev` of document `id`.
    pub async fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let url = self.endpoint(&[id])?;
        let (_, response) = self
            .interact::<DocResponse>(Method::DELETE, url, &[(IF_MATCH, rev)], None)
            .await?;
        check_ok(response).map(|_| ())
    }

    /// Current revision of `id`, or `None` if the document does not exist.
    pub async fn rev(&self, id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&[id])?;
        let response = self.request(Method::HEAD, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }
        let raw = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        strip_etag(raw)
            .map(Some)
            .ok_or_else(|| CouchError::Protocol("Invalid Etag returned from server".to_string()))
    }
}
