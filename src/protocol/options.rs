//! Typed request options and their query-string encodings.
//!
//! CouchDB takes most request options as query parameters, but the two
//! endpoints this crate talks to encode them differently: the changes feed
//! wants plain values, view queries want JSON-encoded keys. [`OptionValue`]
//! carries the value untouched and each endpoint picks its encoding.
//!
//! ```
//! use couchdb_http::protocol::{options, OptionValue};
//!
//! let opts = options([("since", OptionValue::from(858245)), ("include_docs", true.into())]);
//! assert_eq!(opts["since"].to_changes_param(), "858245");
//! assert_eq!(OptionValue::from("ess").to_view_param("startkey"), "\"ess\"");
//! ```

use super::constants::params;
use crate::error::{CouchError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single request option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Explicitly unset; skipped when building query strings.
    Null,
    /// Plain string.
    String(String),
    /// Signed integer.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Document id, never quoted in view queries.
    DocId(String),
    /// Arbitrary JSON (arrays, objects, non-integral numbers).
    Raw(Value),
}

/// Options keyed by parameter name, iterated in name order.
pub type Options = BTreeMap<String, OptionValue>;

/// Build [`Options`] from key/value pairs.
pub fn options<K, V, I>(pairs: I) -> Options
where
    K: Into<String>,
    V: Into<OptionValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl OptionValue {
    /// Convert any serializable value into an option value.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::InvalidOption`] when `value` has no JSON form
    /// (for example a map with non-string keys).
    pub fn from_serialize<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(OptionValue::from)
            .map_err(|e| CouchError::invalid_option(key, e.to_string()))
    }

    /// Whether this value is [`OptionValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, OptionValue::Null)
    }

    /// Encoding used by the changes feed: values are sent as-is.
    pub fn to_changes_param(&self) -> String {
        match self {
            OptionValue::Null => String::new(),
            OptionValue::String(s) | OptionValue::DocId(s) => s.clone(),
            OptionValue::Integer(i) => i.to_string(),
            OptionValue::Boolean(b) => b.to_string(),
            OptionValue::Raw(v) => v.to_string(),
        }
    }

    /// Encoding used by view queries: keys are JSON, so strings get quoted
    /// unless the parameter is one CouchDB reads verbatim.
    pub fn to_view_param(&self, key: &str) -> String {
        match self {
            OptionValue::String(s) if params::UNQUOTED_VIEW_PARAMS.contains(&key) => s.clone(),
            OptionValue::String(s) => Value::String(s.clone()).to_string(),
            other => other.to_changes_param(),
        }
    }

    /// Integer reading of this value, accepting numeric strings. Fractional
    /// numbers have no integer reading.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(i) => Some(*i),
            OptionValue::String(s) => s.trim().parse().ok(),
            OptionValue::Raw(Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }
}

impl From<Value> for OptionValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => OptionValue::Null,
            Value::Bool(b) => OptionValue::Boolean(b),
            Value::String(s) => OptionValue::String(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => OptionValue::Integer(i),
                None => OptionValue::Raw(Value::Number(n)),
            },
            other => OptionValue::Raw(other),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Integer(i64::from(value))
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Integer(i64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Boolean(value)
    }
}

impl TryFrom<f64> for OptionValue {
    type Error = CouchError;

    fn try_from(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(CouchError::invalid_option("<float>", format!("{} is not finite", value)));
        }
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return Ok(OptionValue::Integer(value as i64));
        }
        serde_json::Number::from_f64(value)
            .map(|n| OptionValue::Raw(Value::Number(n)))
            .ok_or_else(|| CouchError::invalid_option("<float>", format!("{} has no JSON form", value)))
    }
}

/// Read the feed heartbeat, in milliseconds, from `options`.
///
/// Absent or null entries yield `default`. Zero or negative values are
/// returned as-is; they disable heartbeats.
///
/// # Errors
///
/// Returns [`CouchError::InvalidOption`] when the value is not an integer or
/// a numeric string.
pub fn heartbeat_option(options: &Options, default: i64) -> Result<i64> {
    match options.get(params::HEARTBEAT) {
        None | Some(OptionValue::Null) => Ok(default),
        Some(value) => value.as_i64().ok_or_else(|| {
            CouchError::invalid_option(
                params::HEARTBEAT,
                format!("expected milliseconds, got {:?}", value),
            )
        }),
    }
}

/// Form-encode `pairs` into a query string, keeping their order.
pub fn encode_query<K, V, I>(pairs: I) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k.as_ref(), v.as_ref());
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_changes_param_encoding() {
        assert_eq!(OptionValue::from("x").to_changes_param(), "x");
        assert_eq!(OptionValue::from(3999).to_changes_param(), "3999");
        assert_eq!(OptionValue::from(true).to_changes_param(), "true");
        assert_eq!(OptionValue::from(json!(["a", 1])).to_changes_param(), r#"["a",1]"#);
    }

    #[test]
    fn test_view_param_encoding() {
        assert_eq!(OptionValue::from(1).to_view_param("i"), "1");
        assert_eq!(OptionValue::from(true).to_view_param("b"), "true");
        assert_eq!(OptionValue::from("ess").to_view_param("s"), "\"ess\"");
        assert_eq!(OptionValue::DocId("le".into()).to_view_param("unk"), "le");
        assert_eq!(OptionValue::from("ess").to_view_param("startkey_docid"), "ess");
        assert_eq!(OptionValue::from("update_after").to_view_param("stale"), "update_after");
        assert_eq!(OptionValue::from(json!(["a"])).to_view_param("startkey"), r#"["a"]"#);
    }

    #[test]
    fn test_from_serialize() {
        assert_eq!(OptionValue::from_serialize("limit", &10).unwrap(), OptionValue::Integer(10));
        assert_eq!(OptionValue::from_serialize("key", "baz").unwrap(), OptionValue::from("baz"));
        assert_eq!(OptionValue::from_serialize("since", &None::<i64>).unwrap(), OptionValue::Null);

        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], "not a string key");
        let err = OptionValue::from_serialize("startkey", &bad).unwrap_err();
        assert!(matches!(err, CouchError::InvalidOption { ref key, .. } if key == "startkey"));
    }

    #[test]
    fn test_float_conversion() {
        assert_eq!(OptionValue::try_from(4.0).unwrap(), OptionValue::Integer(4));
        assert_eq!(OptionValue::try_from(3.14).unwrap().as_i64(), None);
        assert!(OptionValue::try_from(f64::NAN).is_err());
        assert!(OptionValue::try_from(f64::INFINITY).is_err());
    }

    #[test]
    fn test_heartbeat_option() {
        let default = 99;
        assert_eq!(heartbeat_option(&Options::new(), default).unwrap(), 99);
        assert_eq!(heartbeat_option(&options([("heartbeat", 1)]), default).unwrap(), 1);
        assert_eq!(heartbeat_option(&options([("heartbeat", "4")]), default).unwrap(), 4);
        assert_eq!(heartbeat_option(&options([("heartbeat", -3999)]), default).unwrap(), -3999);
        assert_eq!(
            heartbeat_option(&options([("heartbeat", OptionValue::Null)]), default).unwrap(),
            99
        );
        assert!(heartbeat_option(&options([("heartbeat", "five")]), default).is_err());
        assert!(heartbeat_option(&options([("heartbeat", true)]), default).is_err());
    }

    #[test]
    fn test_fractional_heartbeat_is_rejected() {
        let opts = options([("heartbeat", OptionValue::Raw(json!(3.14)))]);
        let err = heartbeat_option(&opts, 99).unwrap_err();
        assert!(matches!(err, CouchError::InvalidOption { .. }));

        let whole = options([("heartbeat", OptionValue::from(json!(2500)))]);
        assert_eq!(heartbeat_option(&whole, 99).unwrap(), 2500);
    }

    #[test]
    fn test_encode_query_keeps_order() {
        let query = encode_query([("since", "858245"), ("heartbeat", "3999")]);
        assert_eq!(query, "since=858245&heartbeat=3999");
        assert_eq!(encode_query([("key", "\"a b\"")]), "key=%22a+b%22");
    }
}
