//! Upstream graph database capability.
//!
//! A [`GraphConnector`] opens [`GraphSession`]s; the executor pools them.
//! Sessions return [`UpstreamValue`]s, an owned mirror of the driver's type
//! system that still carries graph-native shapes (nodes, relationships,
//! paths). They are flattened into [`crate::GraphValue`] before leaving the
//! executor.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::types::Params;

/// A statement to run upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Cypher text.
    pub text: String,
    /// Bound parameters.
    pub params: Params,
}

impl Statement {
    /// Create a statement.
    pub fn new(text: impl Into<String>, params: Params) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// Graph node as returned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamNode {
    /// Database-internal id.
    pub id: i64,
    /// Node labels.
    pub labels: Vec<String>,
    /// Node properties.
    pub properties: BTreeMap<String, UpstreamValue>,
}

/// Graph relationship as returned by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRelationship {
    /// Database-internal id.
    pub id: i64,
    /// Start node id, when the driver reports it.
    pub start: Option<i64>,
    /// End node id, when the driver reports it.
    pub end: Option<i64>,
    /// Relationship type.
    pub rel_type: String,
    /// Relationship properties.
    pub properties: BTreeMap<String, UpstreamValue>,
}

/// Graph path as returned by the driver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpstreamPath {
    /// Nodes in traversal order.
    pub nodes: Vec<UpstreamNode>,
    /// Relationships in traversal order.
    pub relationships: Vec<UpstreamRelationship>,
}

/// Owned driver value.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamValue {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
    /// Byte array.
    Bytes(Vec<u8>),
    /// List.
    List(Vec<UpstreamValue>),
    /// Map.
    Map(BTreeMap<String, UpstreamValue>),
    /// Node.
    Node(UpstreamNode),
    /// Relationship.
    Relationship(UpstreamRelationship),
    /// Path.
    Path(UpstreamPath),
    /// Temporal, spatial or other driver value rendered as text.
    Other(String),
}

/// Rows read from one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpstreamRows {
    /// Column names in `RETURN` order.
    pub columns: Vec<String>,
    /// Row values, positionally matching `columns`.
    pub rows: Vec<Vec<UpstreamValue>>,
    /// Set when the session stopped reading at the row limit.
    pub truncated: bool,
}

/// Failure reported by an upstream session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Transport, connection or authentication failure.
    #[error("graph database unavailable: {0}")]
    Unavailable(String),
    /// The database rejected the statement.
    #[error("graph database rejected the query: {0}")]
    Query(String),
}

/// One logical connection to the graph database.
#[async_trait]
pub trait GraphSession: Send + 'static {
    /// Run a statement, reading at most `row_limit` rows.
    ///
    /// Implementations that cannot enforce read access on the server must not
    /// commit the statement's effects unless configured for writes.
    async fn run(&mut self, statement: &Statement, row_limit: usize) -> Result<UpstreamRows, UpstreamError>;

    /// Bring the session back to a clean state after an abandoned call.
    async fn reset(&mut self) -> Result<(), UpstreamError>;
}

/// Opens sessions against the graph database.
#[async_trait]
pub trait GraphConnector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Session: GraphSession;

    /// Open a new session.
    async fn connect(&self) -> Result<Self::Session, UpstreamError>;
}
