//! Wire types exchanged with CouchDB.
//!
//! Field names follow the JSON the server sends; the Rust names are free to
//! differ. Sequence identifiers are wrapped in [`Seq`] and never interpreted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// An opaque, server-defined position in a database's change history.
///
/// CouchDB 1.x sends integers, 2.x and later send strings such as
/// `"42-g1AAAA..."`. The client stores and resubmits the value verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(Value);

impl Seq {
    /// Wrap a raw JSON value.
    pub fn new(value: impl Into<Value>) -> Self {
        Seq(value.into())
    }

    /// The underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Whether this sequence denotes the start of the history
    /// (absent, empty string or zero).
    pub fn is_origin(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Number(n) => n.as_i64() == Some(0) || n.as_u64() == Some(0),
            _ => false,
        }
    }

    /// Render the sequence as a `since` query parameter value.
    ///
    /// Strings are emitted without quotes, everything else as compact JSON.
    pub fn to_param(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

impl From<i64> for Seq {
    fn from(value: i64) -> Self {
        Seq(Value::from(value))
    }
}

impl From<i32> for Seq {
    fn from(value: i32) -> Self {
        Seq(Value::from(value))
    }
}

impl From<u64> for Seq {
    fn from(value: u64) -> Self {
        Seq(Value::from(value))
    }
}

impl From<&str> for Seq {
    fn from(value: &str) -> Self {
        Seq(Value::from(value))
    }
}

impl From<String> for Seq {
    fn from(value: String) -> Self {
        Seq(Value::from(value))
    }
}

impl From<Value> for Seq {
    fn from(value: Value) -> Self {
        Seq(value)
    }
}

/// A revision touched by a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedRev {
    /// Revision identifier.
    #[serde(rename = "rev")]
    pub revision: String,
}

/// One entry of the changes feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Sequence of this change, to be echoed back as the next `since`.
    #[serde(rename = "seq")]
    pub sequence: Seq,
    /// Document identifier.
    pub id: String,
    /// Leaf revisions changed.
    #[serde(rename = "changes", default)]
    pub changed_revs: Vec<ChangedRev>,
    /// Whether the document was deleted.
    #[serde(default)]
    pub deleted: bool,
}

/// A complete, non-continuous changes response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    /// Changes in feed order.
    pub results: Vec<Change>,
    /// Cursor to resume from after the last result.
    #[serde(rename = "last_seq")]
    pub last_sequence: Seq,
}

/// `_id` and `_rev` of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAndRev {
    /// Document identifier.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Document revision.
    #[serde(rename = "_rev", default)]
    pub rev: String,
}

/// Reply to a document or database modification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Document identifier.
    pub id: String,
    /// New revision.
    pub rev: String,
    /// CouchDB error identifier when `ok` is false.
    pub error: String,
    /// Error detail when `ok` is false.
    pub reason: String,
}

/// Database metadata returned by `GET /<db>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbInfo {
    /// Database name.
    #[serde(rename = "db_name")]
    pub name: String,
    /// Live documents.
    #[serde(default)]
    pub doc_count: u64,
    /// Deleted documents.
    #[serde(rename = "doc_del_count", default)]
    pub doc_deleted_count: u64,
    /// Current update sequence.
    #[serde(default = "null_seq")]
    pub update_seq: Seq,
    /// Current purge sequence.
    #[serde(default = "null_seq")]
    pub purge_seq: Seq,
    /// Whether compaction is running.
    #[serde(rename = "compact_running", default)]
    pub compacting: bool,
    /// Size on disk (CouchDB 1.x).
    #[serde(default)]
    pub disk_size: Option<u64>,
    /// Size of live data (CouchDB 1.x).
    #[serde(default)]
    pub data_size: Option<u64>,
    /// Instance start time.
    #[serde(rename = "instance_start_time", default)]
    pub start_time: String,
    /// On-disk format version.
    #[serde(rename = "disk_format_version", default)]
    pub version: u32,
    /// Sequence last committed to disk (CouchDB 1.x).
    #[serde(rename = "committed_update_seq", default)]
    pub committed_seq: Option<Seq>,
}

fn null_seq() -> Seq {
    Seq(Value::Null)
}

/// One row of a view response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Row {
    /// Emitting document, absent for reduced rows.
    #[serde(default)]
    pub id: Option<String>,
    /// Emitted key.
    #[serde(default)]
    pub key: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyedViewResponse {
    #[serde(default)]
    #[allow(dead_code)]
    pub total_rows: u64,
    #[serde(default)]
    #[allow(dead_code)]
    pub offset: u64,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_params_are_verbatim() {
        assert_eq!(Seq::from(858245).to_param(), "858245");
        assert_eq!(Seq::from("42-g1AAAA").to_param(), "42-g1AAAA");
        assert_eq!(Seq::new(serde_json::json!([3, "x"])).to_param(), r#"[3,"x"]"#);
    }

    #[test]
    fn test_seq_origin() {
        assert!(Seq::new(Value::Null).is_origin());
        assert!(Seq::from(0).is_origin());
        assert!(Seq::from("").is_origin());
        assert!(!Seq::from(7).is_origin());
        assert!(!Seq::from("0-abc").is_origin());
    }

    #[test]
    fn test_change_decodes_optional_fields() {
        let change: Change =
            serde_json::from_str(r#"{"seq":"12-abc","id":"doc1","changes":[{"rev":"1-x"}]}"#)
                .unwrap();
        assert_eq!(change.sequence, Seq::from("12-abc"));
        assert_eq!(change.id, "doc1");
        assert_eq!(change.changed_revs[0].revision, "1-x");
        assert!(!change.deleted);
    }

    #[test]
    fn test_db_info_couch2_shape() {
        let info: DbInfo = serde_json::from_str(
            r#"{"db_name":"feeds","doc_count":3,"doc_del_count":1,
                "update_seq":"5-g1AAAA","purge_seq":"0-g1AAAA",
                "compact_running":false,"disk_format_version":7}"#,
        )
        .unwrap();
        assert_eq!(info.name, "feeds");
        assert_eq!(info.doc_count, 3);
        assert_eq!(info.update_seq, Seq::from("5-g1AAAA"));
        assert!(info.disk_size.is_none());
    }
}
