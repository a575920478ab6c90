//! View queries.

use super::database::Database;
use crate::error::{CouchError, Result};
use crate::protocol::{encode_query, Options};
use crate::types::KeyedViewResponse;
use serde::de::DeserializeOwned;
use url::Url;

impl Database {
    fn view_endpoint(&self, view: &str, params: &Options) -> Result<Url> {
        let segments: Vec<&str> = view.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = self.endpoint(&segments)?;
        let query = encode_query(
            params
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.as_str(), v.to_view_param(k))),
        );
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        Ok(url)
    }

    /// URL of `view` (e.g. `_design/my_foo/_view/my_bar`) with `params`
    /// encoded as view parameters. Credentials are not included.
    ///
    /// ```
    /// use couchdb_http::{protocol::options, Database};
    ///
    /// let db = Database::new("localhost", 5984, "db");
    /// let url = db.view_url("_design/d/_view/v", &options([("limit", 10)])).unwrap();
    /// assert_eq!(url, "http://localhost:5984/db/_design/d/_view/v?limit=10");
    /// ```
    pub fn view_url(&self, view: &str, params: &Options) -> Result<String> {
        Ok(self.view_endpoint(view, params)?.to_string())
    }

    /// Run a view query and decode the whole response into `T`.
    pub async fn query<T: DeserializeOwned>(&self, view: &str, params: &Options) -> Result<T> {
        if view.is_empty() {
            return Err(CouchError::invalid_option("view", "empty view"));
        }
        let url = self.view_endpoint(view, params)?;
        self.unmarshal_url(url).await
    }

    /// Run a view query and collect the ids of the emitting documents.
    pub async fn query_ids(&self, view: &str, params: &Options) -> Result<Vec<String>> {
        let response: KeyedViewResponse = self.query(view, params).await?;
        Ok(response.rows.into_iter().filter_map(|row| row.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{options, OptionValue};
    use serde_json::json;
    use std::collections::HashMap;

    fn query_of(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_view_url_params() {
        let db = Database::new("localhost", 5984, "db");
        let vpath = "_design/testview/_view/v";

        let got = query_of(&db.view_url(vpath, &options([
            ("i", OptionValue::from(1)),
            ("b", true.into()),
            ("s", "ess".into()),
        ])).unwrap());
        assert_eq!(got.len(), 3);
        assert_eq!(got["i"], "1");
        assert_eq!(got["b"], "true");
        assert_eq!(got["s"], "\"ess\"");

        let got = query_of(&db.view_url(vpath, &options([
            ("unk", OptionValue::DocId("le".into())),
            ("startkey_docid", "ess".into()),
            ("stale", "update_after".into()),
            ("startkey", json!(["a"]).into()),
            ("skipped", OptionValue::Null),
        ])).unwrap());
        assert_eq!(got.len(), 4);
        assert_eq!(got["unk"], "le");
        assert_eq!(got["startkey_docid"], "ess");
        assert_eq!(got["stale"], "update_after");
        assert_eq!(got["startkey"], r#"["a"]"#);
    }

    #[test]
    fn test_view_url_path() {
        let db = Database::new("localhost", 5984, "db");
        let url = db.view_url("_design/d/_view/v", &Options::new()).unwrap();
        assert_eq!(url, "http://localhost:5984/db/_design/d/_view/v");
    }

    #[tokio::test]
    async fn test_query_empty_view() {
        let db = Database::new("localhost", 5984, "db");
        let err = db.query::<serde_json::Value>("", &Options::new()).await.unwrap_err();
        assert!(matches!(err, CouchError::InvalidOption { .. }));
        assert!(db.query_ids("", &Options::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_query_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/db/_design/d/_view/v")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "\"baz\"".into()))
            .with_body(
                r#"{"total_rows":3,"offset":0,"rows":[
                    {"id":"a","key":"baz","value":null},
                    {"id":null,"key":null,"value":3},
                    {"id":"b","key":"baz","value":null}]}"#,
            )
            .create_async()
            .await;
        let address = server.socket_address();
        let db = Database::new(address.ip().to_string(), address.port(), "db");
        let ids = db
            .query_ids("_design/d/_view/v", &options([("key", "baz")]))
            .await
            .unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        mock.assert_async().await;
    }
}
