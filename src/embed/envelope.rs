//! Response envelope shared by every endpoint.
//!
//! ```json
//! {"success": true, "data": ...}
//! {"success": false, "error": {"code": "NOT_FOUND", "message": "..."}}
//! ```

use serde::{Deserialize, Serialize};

use super::error::EmbedError;

/// Error half of the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Uniform response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    /// Successful envelope.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed envelope.
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// A façade result: HTTP status plus envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Envelope<T>,
}

impl<T> Reply<T> {
    /// 200 with data.
    pub fn ok(data: T) -> Self {
        Self {
            status: 200,
            body: Envelope::ok(data),
        }
    }

    /// Error reply with the error's status, code and message.
    pub fn from_error(err: &EmbedError) -> Self {
        Self {
            status: err.status(),
            body: Envelope::err(err.code(), err.to_string()),
        }
    }

    /// Whether the reply carries data.
    pub fn is_success(&self) -> bool {
        self.body.success
    }

    /// The payload, if any.
    pub fn data(&self) -> Option<&T> {
        self.body.data.as_ref()
    }

    /// The error code, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.body.error.as_ref().map(|e| e.code.as_str())
    }
}

impl<T> From<Result<T, EmbedError>> for Reply<T> {
    fn from(result: Result<T, EmbedError>) -> Self {
        match result {
            Ok(data) => Reply::ok(data),
            Err(err) => Reply::from_error(&err),
        }
    }
}
