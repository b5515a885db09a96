//! Request and response bodies of the embed API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::EmbedError;
use crate::types::Params;

/// `POST /api/embed` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueEmbedRequest {
    /// Query to bind to the token.
    #[serde(default)]
    pub cypher_query: String,
    /// Requested lifetime in days.
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

impl IssueEmbedRequest {
    /// Request with the default lifetime.
    pub fn new(cypher_query: impl Into<String>) -> Self {
        Self {
            cypher_query: cypher_query.into(),
            expires_in_days: None,
        }
    }

    /// Set the requested lifetime.
    pub fn expires_in_days(mut self, days: i64) -> Self {
        self.expires_in_days = Some(days);
        self
    }
}

/// `POST /api/embed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedIssued {
    /// Viewer URL for the token.
    pub embed_url: String,
    /// The token.
    pub embed_token: String,
    /// Expiry instant (RFC 3339).
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// `GET /api/embed/:token` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedView {
    /// Stored query.
    pub cypher_query: String,
    /// The token.
    pub token: String,
    /// Expiry instant (RFC 3339).
    pub expires_at: DateTime<Utc>,
}

/// `POST /api/proxy/query` body as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyQueryRequest {
    /// Direct query text.
    #[serde(default)]
    pub cypher: Option<String>,
    /// Token whose stored query should run.
    #[serde(default)]
    pub token: Option<String>,
    /// Query parameters, also accepted as `parameters`. A body carrying
    /// both keys is a duplicate field and fails to deserialize.
    #[serde(default, alias = "parameters")]
    pub params: Option<Params>,
    /// Requested timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ProxyQueryRequest {
    /// Request running `cypher` directly.
    pub fn direct(cypher: impl Into<String>) -> Self {
        Self {
            cypher: Some(cypher.into()),
            ..Self::default()
        }
    }

    /// Request running the query stored under `token`.
    pub fn for_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    /// Attach a timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Which query a proxy request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTarget {
    /// The query stored under this token.
    Token(String),
    /// This query text.
    Direct(String),
}

impl ProxyTarget {
    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyTarget::Token(_) => "token",
            ProxyTarget::Direct(_) => "direct",
        }
    }
}

/// A validated proxy request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyQuery {
    /// Query source.
    pub target: ProxyTarget,
    /// Parameters (empty when none were sent).
    pub params: Params,
    /// Requested timeout.
    pub timeout: Option<Duration>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl TryFrom<ProxyQueryRequest> for ProxyQuery {
    type Error = EmbedError;

    fn try_from(request: ProxyQueryRequest) -> Result<Self, Self::Error> {
        let target = match (present(request.token), present(request.cypher)) {
            (Some(token), None) => ProxyTarget::Token(token.trim().to_string()),
            (None, Some(cypher)) => ProxyTarget::Direct(cypher),
            (Some(_), Some(_)) => {
                return Err(EmbedError::Validation(
                    "provide either token or cypher, not both".to_string(),
                ))
            }
            (None, None) => return Err(EmbedError::Validation("cypher or token is required".to_string())),
        };

        Ok(Self {
            target,
            params: request.params.unwrap_or_default(),
            timeout: request.timeout_ms.map(Duration::from_millis),
        })
    }
}
