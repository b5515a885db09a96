//! Flattening of graph-native values into [`GraphValue`]s.
//!
//! | Upstream | Flattened |
//! |----------|-----------|
//! | node | `{identity, labels, properties}` |
//! | relationship | `{identity, start, end, type, properties}` |
//! | path | `{nodes, relationships}` |
//! | bytes | list of integers |
//! | other driver values | string |

use std::collections::BTreeMap;

use super::upstream::{UpstreamNode, UpstreamRelationship, UpstreamRows, UpstreamValue};
use crate::types::{GraphValue, QueryResult, Row};

/// Flatten a whole result set.
pub fn flatten_rows(upstream: UpstreamRows) -> QueryResult {
    let UpstreamRows {
        columns,
        rows,
        truncated,
    } = upstream;

    let rows = rows
        .into_iter()
        .map(|values| {
            columns
                .iter()
                .cloned()
                .zip(values.into_iter().map(flatten_value))
                .collect::<Row>()
        })
        .collect();

    QueryResult {
        columns,
        rows,
        truncated,
    }
}

/// Flatten one value.
pub fn flatten_value(value: UpstreamValue) -> GraphValue {
    match value {
        UpstreamValue::Null => GraphValue::Null,
        UpstreamValue::Bool(b) => GraphValue::Bool(b),
        UpstreamValue::Int(i) => GraphValue::Int(i),
        UpstreamValue::Float(f) => GraphValue::Float(f),
        UpstreamValue::String(s) => GraphValue::String(s),
        UpstreamValue::Bytes(bytes) => {
            GraphValue::List(bytes.into_iter().map(|b| GraphValue::Int(b as i64)).collect())
        }
        UpstreamValue::List(items) => GraphValue::List(items.into_iter().map(flatten_value).collect()),
        UpstreamValue::Map(map) => GraphValue::Map(flatten_map(map)),
        UpstreamValue::Node(node) => flatten_node(node),
        UpstreamValue::Relationship(rel) => flatten_relationship(rel),
        UpstreamValue::Path(path) => {
            let mut map = BTreeMap::new();
            map.insert(
                "nodes".to_string(),
                GraphValue::List(path.nodes.into_iter().map(flatten_node).collect()),
            );
            map.insert(
                "relationships".to_string(),
                GraphValue::List(path.relationships.into_iter().map(flatten_relationship).collect()),
            );
            GraphValue::Map(map)
        }
        UpstreamValue::Other(text) => GraphValue::String(text),
    }
}

fn flatten_map(map: BTreeMap<String, UpstreamValue>) -> BTreeMap<String, GraphValue> {
    map.into_iter().map(|(k, v)| (k, flatten_value(v))).collect()
}

fn flatten_node(node: UpstreamNode) -> GraphValue {
    let mut map = BTreeMap::new();
    map.insert("identity".to_string(), GraphValue::Int(node.id));
    map.insert(
        "labels".to_string(),
        GraphValue::List(node.labels.into_iter().map(GraphValue::String).collect()),
    );
    map.insert("properties".to_string(), GraphValue::Map(flatten_map(node.properties)));
    GraphValue::Map(map)
}

fn flatten_relationship(rel: UpstreamRelationship) -> GraphValue {
    let endpoint = |id: Option<i64>| id.map(GraphValue::Int).unwrap_or(GraphValue::Null);

    let mut map = BTreeMap::new();
    map.insert("identity".to_string(), GraphValue::Int(rel.id));
    map.insert("start".to_string(), endpoint(rel.start));
    map.insert("end".to_string(), endpoint(rel.end));
    map.insert("type".to_string(), GraphValue::String(rel.rel_type));
    map.insert("properties".to_string(), GraphValue::Map(flatten_map(rel.properties)));
    GraphValue::Map(map)
}
