//! In-process upstream with canned responses.
//!
//! Responses are keyed by the trimmed query text. Unknown queries are
//! rejected the way a database rejects a bad statement.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::upstream::{
    GraphConnector, GraphSession, Statement, UpstreamError, UpstreamNode, UpstreamRows, UpstreamValue,
};

/// What the fixture does for a given query.
#[derive(Debug, Clone)]
pub enum FixtureResponse {
    /// Return these rows (subject to the row limit).
    Rows(UpstreamRows),
    /// Sleep for this long, then return no rows.
    Stall(Duration),
    /// Fail with this error.
    Fail(UpstreamError),
}

#[derive(Default)]
struct FixtureState {
    responses: RwLock<HashMap<String, FixtureResponse>>,
    statements: RwLock<Vec<Statement>>,
    connects: AtomicU64,
    resets: AtomicU64,
    unavailable: AtomicBool,
    failing_resets: AtomicBool,
}

impl FixtureState {
    fn check_available(&self) -> Result<(), UpstreamError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(UpstreamError::Unavailable("fixture upstream is offline".to_string()));
        }
        Ok(())
    }
}

/// Connector producing [`FixtureSession`]s that share one response table.
#[derive(Clone, Default)]
pub struct FixtureConnector {
    state: Arc<FixtureState>,
}

impl FixtureConnector {
    /// Create a fixture with no responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`respond`](Self::respond).
    pub fn with_response(self, query: &str, response: FixtureResponse) -> Self {
        self.respond(query, response);
        self
    }

    /// Register the response for `query`.
    pub fn respond(&self, query: &str, response: FixtureResponse) {
        self.state
            .responses
            .write()
            .insert(query.trim().to_string(), response);
    }

    /// Take the upstream offline (or bring it back).
    pub fn set_available(&self, available: bool) {
        self.state.unavailable.store(!available, Ordering::Release);
    }

    /// Make every session reset fail.
    pub fn fail_resets(&self, failing: bool) {
        self.state.failing_resets.store(failing, Ordering::Release);
    }

    /// Sessions opened so far.
    pub fn connect_count(&self) -> u64 {
        self.state.connects.load(Ordering::Relaxed)
    }

    /// Successful session resets so far.
    pub fn reset_count(&self) -> u64 {
        self.state.resets.load(Ordering::Relaxed)
    }

    /// Statements received so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.state.statements.read().clone()
    }

    /// Rows with a single column `column` holding one node per entry.
    ///
    /// Node ids are assigned from 0 in order.
    pub fn nodes<I, P>(column: &str, label: &str, properties: I) -> UpstreamRows
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = (String, UpstreamValue)>,
    {
        let rows = properties
            .into_iter()
            .enumerate()
            .map(|(id, props)| {
                vec![UpstreamValue::Node(UpstreamNode {
                    id: id as i64,
                    labels: vec![label.to_string()],
                    properties: props.into_iter().collect::<BTreeMap<_, _>>(),
                })]
            })
            .collect();

        UpstreamRows {
            columns: vec![column.to_string()],
            rows,
            truncated: false,
        }
    }
}

#[async_trait]
impl GraphConnector for FixtureConnector {
    type Session = FixtureSession;

    async fn connect(&self) -> Result<FixtureSession, UpstreamError> {
        self.state.check_available()?;
        self.state.connects.fetch_add(1, Ordering::Relaxed);
        Ok(FixtureSession {
            state: Arc::clone(&self.state),
        })
    }
}

/// Session over a [`FixtureConnector`]'s response table.
pub struct FixtureSession {
    state: Arc<FixtureState>,
}

#[async_trait]
impl GraphSession for FixtureSession {
    async fn run(&mut self, statement: &Statement, row_limit: usize) -> Result<UpstreamRows, UpstreamError> {
        self.state.check_available()?;
        self.state.statements.write().push(statement.clone());

        let response = self.state.responses.read().get(statement.text.trim()).cloned();
        match response {
            Some(FixtureResponse::Rows(mut rows)) => {
                if rows.rows.len() > row_limit {
                    rows.rows.truncate(row_limit);
                    rows.truncated = true;
                }
                Ok(rows)
            }
            Some(FixtureResponse::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(UpstreamRows::default())
            }
            Some(FixtureResponse::Fail(err)) => Err(err),
            None => Err(UpstreamError::Query(format!(
                "no fixture response for query: {}",
                statement.text.trim()
            ))),
        }
    }

    async fn reset(&mut self) -> Result<(), UpstreamError> {
        self.state.check_available()?;
        if self.state.failing_resets.load(Ordering::Acquire) {
            return Err(UpstreamError::Unavailable("fixture reset failed".to_string()));
        }
        self.state.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
