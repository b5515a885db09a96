//! Transport-neutral query values.
//!
//! `GraphValue` is the closed value domain that crosses the executor
//! boundary. Driver handles (nodes, relationships, paths) are flattened into
//! maps before they get here; see [`crate::executor::flatten`].

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// A single value in a query result or parameter map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphValue {
    /// Null / missing.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list.
    List(Vec<GraphValue>),
    /// String-keyed map (keys sorted for stable output).
    Map(BTreeMap<String, GraphValue>),
}

impl GraphValue {
    /// Borrow as a map, if this is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, GraphValue>> {
        match self {
            GraphValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as a string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GraphValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow as a list, if this is one.
    pub fn as_list(&self) -> Option<&[GraphValue]> {
        match self {
            GraphValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&GraphValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, GraphValue::Null)
    }
}

impl From<bool> for GraphValue {
    fn from(v: bool) -> Self {
        GraphValue::Bool(v)
    }
}

impl From<i64> for GraphValue {
    fn from(v: i64) -> Self {
        GraphValue::Int(v)
    }
}

impl From<f64> for GraphValue {
    fn from(v: f64) -> Self {
        GraphValue::Float(v)
    }
}

impl From<&str> for GraphValue {
    fn from(v: &str) -> Self {
        GraphValue::String(v.to_string())
    }
}

impl From<String> for GraphValue {
    fn from(v: String) -> Self {
        GraphValue::String(v)
    }
}

impl From<Vec<GraphValue>> for GraphValue {
    fn from(v: Vec<GraphValue>) -> Self {
        GraphValue::List(v)
    }
}

impl From<BTreeMap<String, GraphValue>> for GraphValue {
    fn from(v: BTreeMap<String, GraphValue>) -> Self {
        GraphValue::Map(v)
    }
}

/// Named query parameters.
pub type Params = BTreeMap<String, GraphValue>;

/// One result row: column name to value.
pub type Row = BTreeMap<String, GraphValue>;

/// Rows returned by a proxied query.
///
/// Serializes as a plain JSON array of row objects; column order and the
/// truncation flag are available to Rust callers only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names in `RETURN` order.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Row>,
    /// Set when rows past the executor's row limit were dropped.
    pub truncated: bool,
}

impl QueryResult {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rows.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QueryResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Row>::deserialize(deserializer)?;
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Ok(Self {
            columns,
            rows,
            truncated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_deserialize_from_json() {
        let params: Params = serde_json::from_str(
            r#"{"name": "Tom", "born": 1956, "score": 0.5, "tags": ["a", null], "nested": {"ok": true}}"#,
        )
        .unwrap();

        assert_eq!(params["name"], GraphValue::from("Tom"));
        assert_eq!(params["born"], GraphValue::Int(1956));
        assert_eq!(params["score"], GraphValue::Float(0.5));
        assert_eq!(
            params["tags"],
            GraphValue::List(vec![GraphValue::from("a"), GraphValue::Null])
        );
        assert_eq!(params["nested"].get("ok"), Some(&GraphValue::Bool(true)));
    }

    #[test]
    fn test_query_result_serializes_as_array() {
        let mut row = Row::new();
        row.insert("n".to_string(), GraphValue::Int(1));
        let result = QueryResult {
            columns: vec!["n".to_string()],
            rows: vec![row],
            truncated: true,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!([{"n": 1}]));
    }
}
