//! Core types for embed tokens and query results.

pub mod token;
pub mod value;

pub use token::{EmbedRecord, EmbedToken, TokenState, TOKEN_BYTES, TOKEN_LEN};
pub use value::{GraphValue, Params, QueryResult, Row};
