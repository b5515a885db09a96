//! Neo4j upstream over the bolt protocol (`neo4rs`).
//!
//! Each pooled session owns a driver handle limited to one connection, so
//! the [`SessionPool`](super::SessionPool) alone decides how many bolt
//! connections are open.
//!
//! With `read_only` set (the default, tied to `ALLOW_WRITE_QUERIES`) every
//! statement runs inside an explicit transaction that is always rolled back,
//! so nothing a proxied query does is ever committed. Bolt records carry no
//! column order once decoded, so columns are reported sorted by name.

use std::collections::BTreeMap;

use async_trait::async_trait;
use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNode, BoltNull, BoltString, BoltType, ConfigBuilder,
    Graph, Query, Row, Txn,
};
use tracing::{debug, warn};

use super::upstream::{
    GraphConnector, GraphSession, Statement, UpstreamError, UpstreamNode, UpstreamPath, UpstreamRelationship,
    UpstreamRows, UpstreamValue,
};
use crate::gate::env_flag;
use crate::types::GraphValue;

/// Neo4j connection settings.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Bolt URI.
    pub uri: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Records fetched per round trip.
    pub fetch_size: usize,
    /// Roll back every statement instead of committing it (default: true).
    pub read_only: bool,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            fetch_size: 200,
            read_only: true,
        }
    }
}

impl Neo4jConfig {
    /// Load from `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD`, `NEO4J_DATABASE`;
    /// sessions commit only when `ALLOW_WRITE_QUERIES` is set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: std::env::var("NEO4J_URI").unwrap_or(defaults.uri),
            user: std::env::var("NEO4J_USER").unwrap_or(defaults.user),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: std::env::var("NEO4J_DATABASE").unwrap_or(defaults.database),
            fetch_size: defaults.fetch_size,
            read_only: !env_flag("ALLOW_WRITE_QUERIES").unwrap_or(false),
        }
    }
}

/// Opens one single-connection driver handle per session.
pub struct Neo4jConnector {
    config: Neo4jConfig,
}

impl Neo4jConnector {
    /// Create a connector. No connection is made until the first session.
    pub fn new(config: Neo4jConfig) -> Self {
        Self { config }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(Neo4jConfig::from_env())
    }

    /// Active settings.
    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }
}

#[async_trait]
impl GraphConnector for Neo4jConnector {
    type Session = Neo4jSession;

    async fn connect(&self) -> Result<Neo4jSession, UpstreamError> {
        let config = ConfigBuilder::default()
            .uri(self.config.uri.as_str())
            .user(self.config.user.as_str())
            .password(self.config.password.as_str())
            .db(self.config.database.as_str())
            .fetch_size(self.config.fetch_size)
            .max_connections(1)
            .build()
            .map_err(classify)?;

        let graph = Graph::connect(config).await.map_err(classify)?;
        debug!(uri = %self.config.uri, read_only = self.config.read_only, "Connected to Neo4j");
        Ok(Neo4jSession {
            graph,
            read_only: self.config.read_only,
        })
    }
}

/// A single bolt connection.
pub struct Neo4jSession {
    graph: Graph,
    read_only: bool,
}

impl Neo4jSession {
    async fn run_committed(&mut self, query: Query, row_limit: usize) -> Result<UpstreamRows, UpstreamError> {
        let mut stream = self.graph.execute(query).await.map_err(classify)?;
        let mut rows = RowCollector::new(row_limit);
        while let Some(row) = stream.next().await.map_err(classify)? {
            if !rows.push(&row)? {
                break;
            }
        }
        Ok(rows.finish())
    }

    async fn run_rolled_back(&mut self, query: Query, row_limit: usize) -> Result<UpstreamRows, UpstreamError> {
        let mut txn = self.graph.start_txn().await.map_err(classify)?;
        let result = read_in_txn(&mut txn, query, row_limit).await;
        let rollback = txn.rollback().await;

        let rows = result?;
        if let Err(e) = rollback {
            warn!(error = %e, "Rollback of read-only statement failed");
            return Err(UpstreamError::Unavailable(e.to_string()));
        }
        Ok(rows)
    }
}

async fn read_in_txn(txn: &mut Txn, query: Query, row_limit: usize) -> Result<UpstreamRows, UpstreamError> {
    let mut stream = txn.execute(query).await.map_err(classify)?;
    let mut rows = RowCollector::new(row_limit);
    while let Some(row) = stream.next(txn.handle()).await.map_err(classify)? {
        if !rows.push(&row)? {
            break;
        }
    }
    Ok(rows.finish())
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn run(&mut self, statement: &Statement, row_limit: usize) -> Result<UpstreamRows, UpstreamError> {
        let query = statement
            .params
            .iter()
            .fold(Query::new(statement.text.clone()), |q, (name, value)| {
                q.param(name, to_bolt(value))
            });

        if self.read_only {
            self.run_rolled_back(query, row_limit).await
        } else {
            self.run_committed(query, row_limit).await
        }
    }

    async fn reset(&mut self) -> Result<(), UpstreamError> {
        self.graph.run(Query::new("RETURN 1".to_string())).await.map_err(classify)
    }
}

/// Reads decoded records into positional rows, stopping at the row limit.
struct RowCollector {
    out: UpstreamRows,
    limit: usize,
}

impl RowCollector {
    fn new(limit: usize) -> Self {
        Self {
            out: UpstreamRows::default(),
            limit,
        }
    }

    /// Returns false once the limit is reached and reading should stop.
    fn push(&mut self, row: &Row) -> Result<bool, UpstreamError> {
        let fields: BTreeMap<String, BoltType> = row
            .to()
            .map_err(|e| UpstreamError::Query(format!("undecodable record: {}", e)))?;
        Ok(self.push_fields(fields))
    }

    fn push_fields(&mut self, mut fields: BTreeMap<String, BoltType>) -> bool {
        if self.out.rows.len() >= self.limit {
            self.out.truncated = true;
            return false;
        }
        if self.out.rows.is_empty() {
            self.out.columns = fields.keys().cloned().collect();
        }
        let values = self
            .out
            .columns
            .iter()
            .map(|column| fields.remove(column).map_or(UpstreamValue::Null, from_bolt))
            .collect();
        self.out.rows.push(values);
        true
    }

    fn finish(self) -> UpstreamRows {
        self.out
    }
}

/// Who a server status code blames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// The statement itself.
    Statement,
    /// The database or cluster.
    Availability,
}

/// Classify the first `Neo.*` status code found in a driver error.
fn server_fault(detail: &str) -> Option<Fault> {
    let start = detail.find("Neo.")?;
    let code: String = detail[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();

    let availability = code.starts_with("Neo.TransientError.")
        || code.starts_with("Neo.DatabaseError.")
        || code.starts_with("Neo.ClientError.Cluster.")
        || code == "Neo.ClientError.Database.DatabaseNotFound"
        || code == "Neo.ClientError.General.DatabaseUnavailable";
    if availability {
        Some(Fault::Availability)
    } else if code.starts_with("Neo.ClientError.") {
        Some(Fault::Statement)
    } else {
        None
    }
}

/// Sort driver errors into availability failures and statement failures.
///
/// A server status code decides when present; otherwise transport, auth and
/// protocol errors mean the connection is unusable.
fn classify(err: neo4rs::Error) -> UpstreamError {
    let message = err.to_string();
    match server_fault(&format!("{:?}", err)) {
        Some(Fault::Availability) => return UpstreamError::Unavailable(message),
        Some(Fault::Statement) => return UpstreamError::Query(message),
        None => {}
    }
    match err {
        neo4rs::Error::IOError { .. }
        | neo4rs::Error::ConnectionError { .. }
        | neo4rs::Error::AuthenticationError { .. }
        | neo4rs::Error::UnexpectedMessage { .. }
        | neo4rs::Error::UnknownMessage { .. } => UpstreamError::Unavailable(message),
        _ => UpstreamError::Query(message),
    }
}

fn to_bolt(value: &GraphValue) -> BoltType {
    match value {
        GraphValue::Null => BoltType::Null(BoltNull),
        GraphValue::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        GraphValue::Int(i) => BoltType::Integer(BoltInteger::new(*i)),
        GraphValue::Float(f) => BoltType::Float(BoltFloat::new(*f)),
        GraphValue::String(s) => BoltType::String(BoltString::new(s)),
        GraphValue::List(items) => BoltType::List(BoltList::from(items.iter().map(to_bolt).collect::<Vec<_>>())),
        GraphValue::Map(map) => {
            let mut bolt = BoltMap::new();
            for (k, v) in map {
                bolt.put(BoltString::new(k), to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}

fn bolt_map(map: BoltMap) -> BTreeMap<String, UpstreamValue> {
    map.value
        .into_iter()
        .map(|(k, v)| (k.value, from_bolt(v)))
        .collect()
}

fn bolt_node(node: BoltNode) -> UpstreamNode {
    UpstreamNode {
        id: node.id.value,
        labels: node
            .labels
            .value
            .into_iter()
            .filter_map(|l| match l {
                BoltType::String(s) => Some(s.value),
                _ => None,
            })
            .collect(),
        properties: bolt_map(node.properties),
    }
}

fn from_bolt(value: BoltType) -> UpstreamValue {
    match value {
        BoltType::Null(_) => UpstreamValue::Null,
        BoltType::Boolean(b) => UpstreamValue::Bool(b.value),
        BoltType::Integer(i) => UpstreamValue::Int(i.value),
        BoltType::Float(f) => UpstreamValue::Float(f.value),
        BoltType::String(s) => UpstreamValue::String(s.value),
        BoltType::Bytes(b) => UpstreamValue::Bytes(b.value.to_vec()),
        BoltType::List(list) => UpstreamValue::List(list.value.into_iter().map(from_bolt).collect()),
        BoltType::Map(map) => UpstreamValue::Map(bolt_map(map)),
        BoltType::Node(node) => UpstreamValue::Node(bolt_node(node)),
        BoltType::Relation(rel) => UpstreamValue::Relationship(UpstreamRelationship {
            id: rel.id.value,
            start: Some(rel.start_node_id.value),
            end: Some(rel.end_node_id.value),
            rel_type: rel.typ.value,
            properties: bolt_map(rel.properties),
        }),
        BoltType::UnboundedRelation(rel) => UpstreamValue::Relationship(UpstreamRelationship {
            id: rel.id.value,
            start: None,
            end: None,
            rel_type: rel.typ.value,
            properties: bolt_map(rel.properties),
        }),
        BoltType::Path(path) => UpstreamValue::Path(bolt_path(path.nodes, path.rels, path.indices)),
        other => UpstreamValue::Other(format!("{:?}", other)),
    }
}

/// Rebuild a path from bolt's deduplicated nodes/relationships and the
/// index sequence that walks them.
///
/// Indices alternate relationship, node. A relationship index `r > 0` is
/// traversed forwards, `r < 0` backwards; both are 1-based.
fn bolt_path(nodes: BoltList, rels: BoltList, indices: BoltList) -> UpstreamPath {
    let nodes: Vec<UpstreamNode> = nodes
        .value
        .into_iter()
        .filter_map(|n| match n {
            BoltType::Node(n) => Some(bolt_node(n)),
            _ => None,
        })
        .collect();
    let rels: Vec<(i64, String, BTreeMap<String, UpstreamValue>)> = rels
        .value
        .into_iter()
        .filter_map(|r| match r {
            BoltType::UnboundedRelation(r) => Some((r.id.value, r.typ.value, bolt_map(r.properties))),
            _ => None,
        })
        .collect();
    let indices: Vec<i64> = indices
        .value
        .into_iter()
        .filter_map(|i| match i {
            BoltType::Integer(i) => Some(i.value),
            _ => None,
        })
        .collect();

    let mut path = UpstreamPath::default();
    let Some(first) = nodes.first() else {
        return path;
    };
    path.nodes.push(first.clone());
    let mut current = first.id;

    for step in indices.chunks_exact(2) {
        let (rel_index, node_index) = (step[0], step[1]);
        let Some(next) = usize::try_from(node_index).ok().and_then(|i| nodes.get(i)) else {
            break;
        };
        let Some((id, rel_type, properties)) = rel_index
            .unsigned_abs()
            .checked_sub(1)
            .and_then(|i| rels.get(i as usize))
        else {
            break;
        };
        let (start, end) = if rel_index > 0 {
            (current, next.id)
        } else {
            (next.id, current)
        };
        path.relationships.push(UpstreamRelationship {
            id: *id,
            start: Some(start),
            end: Some(end),
            rel_type: rel_type.clone(),
            properties: properties.clone(),
        });
        path.nodes.push(next.clone());
        current = next.id;
    }

    path
}
