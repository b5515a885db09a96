//! Query safety gate.
//!
//! Cypher has no execution mode that forbids string-built statements, so the
//! proxy inspects every query statically before it reaches the graph
//! database.
//!
//! ## Policy
//!
//! | Rule | Rejection |
//! |------|-----------|
//! | Blank text | `Empty` |
//! | Longer than `max_query_length` | `TooLong` |
//! | Unterminated string/comment/name | `Malformed` |
//! | `;` followed by more text | `MultipleStatements` |
//! | Write or admin clause (read-only mode) | `WriteClause` |
//! | `CALL` of a procedure outside the allowlist (read-only mode) | `ProcedureNotAllowed` |
//! | Inline string literal (unless allowed) | `InlineLiteral` |
//! | `$x` referenced but not supplied | `MissingParameter` |
//! | Supplied parameter never referenced | `UnusedParameter` |

pub mod lexer;

use std::collections::BTreeSet;

use lexer::{tokenize, Lexeme, LexemeKind};

use crate::types::Params;

/// Clause keywords that write data or change the database.
pub const WRITE_KEYWORDS: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH", "LOAD",
    "ALTER", "GRANT", "DENY", "REVOKE", "RENAME", "START", "STOP", "TERMINATE", "ENABLE",
    "DEALLOCATE", "REALLOCATE",
];

/// Read-only procedures callable when write mode is off.
pub const DEFAULT_ALLOWED_PROCEDURES: &[&str] = &[
    "db.labels",
    "db.relationshipTypes",
    "db.propertyKeys",
    "db.schema.visualization",
    "db.schema.nodeTypeProperties",
    "db.schema.relTypeProperties",
];

/// Why a query was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    /// Query text is blank.
    #[error("query text is empty")]
    Empty,
    /// Query text exceeds the configured limit.
    #[error("query is {length} bytes, the limit is {limit}")]
    TooLong {
        /// Length of the submitted text in bytes.
        length: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// Query text could not be tokenized.
    #[error("query text is malformed: {0}")]
    Malformed(String),
    /// More than one statement.
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    /// A write or administrative clause in read-only mode.
    #[error("`{0}` is not allowed in read-only mode")]
    WriteClause(String),
    /// A procedure call outside the allowlist.
    #[error("procedure `{0}` is not allowed")]
    ProcedureNotAllowed(String),
    /// A string literal embedded in the query text.
    #[error("string literals must be passed as parameters")]
    InlineLiteral,
    /// A referenced parameter with no supplied value.
    #[error("parameter `${0}` is referenced but not supplied")]
    MissingParameter(String),
    /// A supplied parameter the query never references.
    #[error("parameter `{0}` is supplied but never referenced")]
    UnusedParameter(String),
}

impl RejectionReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Empty => "EMPTY_QUERY",
            RejectionReason::TooLong { .. } => "QUERY_TOO_LONG",
            RejectionReason::Malformed(_) => "MALFORMED_QUERY",
            RejectionReason::MultipleStatements => "MULTIPLE_STATEMENTS",
            RejectionReason::WriteClause(_) => "WRITE_CLAUSE",
            RejectionReason::ProcedureNotAllowed(_) => "PROCEDURE_NOT_ALLOWED",
            RejectionReason::InlineLiteral => "INLINE_LITERAL",
            RejectionReason::MissingParameter(_) => "MISSING_PARAMETER",
            RejectionReason::UnusedParameter(_) => "UNUSED_PARAMETER",
        }
    }
}

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Allow write clauses and any procedure (default: false).
    pub read_write: bool,
    /// Maximum query length in bytes (default: 10 000).
    pub max_query_length: usize,
    /// Allow inline string literals (default: false).
    pub allow_string_literals: bool,
    /// Procedures callable in read-only mode.
    pub allowed_procedures: BTreeSet<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            read_write: false,
            max_query_length: 10_000,
            allow_string_literals: false,
            allowed_procedures: DEFAULT_ALLOWED_PROCEDURES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl GateConfig {
    /// Load from `ALLOW_WRITE_QUERIES`, `QUERY_MAX_LENGTH` and
    /// `ALLOW_STRING_LITERALS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            read_write: env_flag("ALLOW_WRITE_QUERIES").unwrap_or(defaults.read_write),
            max_query_length: std::env::var("QUERY_MAX_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_query_length),
            allow_string_literals: env_flag("ALLOW_STRING_LITERALS")
                .unwrap_or(defaults.allow_string_literals),
            allowed_procedures: defaults.allowed_procedures,
        }
    }
}

pub(crate) fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

/// What the gate learned about an accepted query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryShape {
    /// Parameter names referenced in the text.
    pub parameters: BTreeSet<String>,
}

/// Static safety check run before any query reaches the graph database.
#[derive(Debug, Clone, Default)]
pub struct QueryGate {
    config: GateConfig,
}

impl QueryGate {
    /// Create a gate with the given configuration.
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Full check: structure plus parameter binding.
    pub fn validate(&self, cypher: &str, params: &Params) -> Result<QueryShape, RejectionReason> {
        let shape = self.inspect(cypher)?;

        if let Some(missing) = shape.parameters.iter().find(|p| !params.contains_key(*p)) {
            return Err(RejectionReason::MissingParameter(missing.clone()));
        }
        if let Some(unused) = params.keys().find(|k| !shape.parameters.contains(*k)) {
            return Err(RejectionReason::UnusedParameter(unused.clone()));
        }

        Ok(shape)
    }

    /// Structural check only; parameters are not compared.
    ///
    /// Used when storing a query whose parameters arrive later.
    pub fn validate_structure(&self, cypher: &str) -> Result<QueryShape, RejectionReason> {
        self.inspect(cypher)
    }

    fn inspect(&self, cypher: &str) -> Result<QueryShape, RejectionReason> {
        if cypher.trim().is_empty() {
            return Err(RejectionReason::Empty);
        }
        if cypher.len() > self.config.max_query_length {
            return Err(RejectionReason::TooLong {
                length: cypher.len(),
                limit: self.config.max_query_length,
            });
        }

        let lexemes = tokenize(cypher).map_err(|e| RejectionReason::Malformed(e.to_string()))?;
        let mut shape = QueryShape::default();

        for (idx, lexeme) in lexemes.iter().enumerate() {
            match lexeme.kind {
                LexemeKind::Semicolon => {
                    if idx + 1 < lexemes.len() {
                        return Err(RejectionReason::MultipleStatements);
                    }
                }
                LexemeKind::StringLiteral => {
                    if !self.config.allow_string_literals {
                        return Err(RejectionReason::InlineLiteral);
                    }
                }
                LexemeKind::Parameter => {
                    shape.parameters.insert(lexeme.text.to_string());
                }
                LexemeKind::Word if !self.config.read_write && is_clause_position(&lexemes, idx) => {
                    self.check_clause_word(&lexemes, idx)?;
                }
                _ => {}
            }
        }

        Ok(shape)
    }

    fn check_clause_word(&self, lexemes: &[Lexeme<'_>], idx: usize) -> Result<(), RejectionReason> {
        let word = lexemes[idx].text;

        if let Some(keyword) = WRITE_KEYWORDS.iter().find(|k| word.eq_ignore_ascii_case(k)) {
            return Err(RejectionReason::WriteClause(keyword.to_string()));
        }

        // CALL { ... } IN TRANSACTIONS commits in batches
        if word.eq_ignore_ascii_case("IN")
            && lexemes.get(idx + 1).is_some_and(|next| next.is_word("TRANSACTIONS"))
        {
            return Err(RejectionReason::WriteClause("IN TRANSACTIONS".to_string()));
        }

        if word.eq_ignore_ascii_case("CALL") {
            // Subquery bodies are checked like any other text
            if lexemes.get(idx + 1).is_some_and(|next| next.is_punct('{')) {
                return Ok(());
            }
            let name = procedure_name(&lexemes[idx + 1..]);
            let allowed = self
                .config
                .allowed_procedures
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&name));
            if !allowed {
                return Err(RejectionReason::ProcedureNotAllowed(name));
            }
        }

        Ok(())
    }
}

/// Whether the word at `idx` can be a clause keyword.
///
/// Property keys (`n.set`), labels and relationship types (`:Create`), and
/// map keys (`{delete: 1}`) are names, not clauses.
fn is_clause_position(lexemes: &[Lexeme<'_>], idx: usize) -> bool {
    let after_name_sigil = idx > 0 && {
        let prev = &lexemes[idx - 1];
        prev.is_punct('.') || prev.is_punct(':')
    };
    let before_colon = lexemes.get(idx + 1).is_some_and(|next| next.is_punct(':'));
    !after_name_sigil && !before_colon
}

/// Read a dotted procedure name such as `db.schema.visualization`.
fn procedure_name(lexemes: &[Lexeme<'_>]) -> String {
    let mut name = String::new();
    let mut expect_part = true;

    for lexeme in lexemes {
        match lexeme.kind {
            LexemeKind::Word | LexemeKind::QuotedName if expect_part => {
                name.push_str(lexeme.text);
                expect_part = false;
            }
            LexemeKind::Punct('.') if !expect_part => {
                name.push('.');
                expect_part = true;
            }
            _ => break,
        }
    }

    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphValue;

    fn gate() -> QueryGate {
        QueryGate::default()
    }

    fn params(names: &[&str]) -> Params {
        names
            .iter()
            .map(|n| (n.to_string(), GraphValue::Int(1)))
            .collect()
    }

    #[test]
    fn test_read_query_passes() {
        assert!(gate().validate("MATCH (n) RETURN n", &Params::new()).is_ok());
        assert!(gate()
            .validate("MATCH (p:Person)-[r:ACTED_IN]->(m:Movie) RETURN p,r,m LIMIT 25", &Params::new())
            .is_ok());
    }

    #[test]
    fn test_write_query_rejected() {
        let err = gate().validate("CREATE (n) RETURN n", &Params::new()).unwrap_err();
        assert_eq!(err, RejectionReason::WriteClause("CREATE".to_string()));
    }

    #[test]
    fn test_write_keywords_any_case() {
        for query in [
            "match (n) detach delete n",
            "MATCH (n) SET n.x = 1",
            "MATCH (n) remove n.x",
            "merge (n:Person {id: 1})",
            "DROP INDEX foo",
            "LOAD CSV FROM $url AS line RETURN line",
            "MATCH (n) FOREACH (x IN [1] | SET n.y = x)",
        ] {
            let err = gate().validate_structure(query).unwrap_err();
            assert!(matches!(err, RejectionReason::WriteClause(_)), "{}", query);
        }
    }

    #[test]
    fn test_keywords_as_names_are_fine() {
        let query = "MATCH (n:Create)-[:DELETE]->(m {set: 1}) RETURN n.merge, m.`remove`";
        assert!(gate().validate_structure(query).is_ok());
    }

    #[test]
    fn test_keywords_in_comments_are_ignored() {
        let query = "MATCH (n) // CREATE (x)\n/* DELETE n */ RETURN n";
        assert!(gate().validate_structure(query).is_ok());
    }

    #[test]
    fn test_read_write_mode_allows_writes() {
        let gate = QueryGate::new(GateConfig {
            read_write: true,
            ..GateConfig::default()
        });
        assert!(gate.validate("CREATE (n) RETURN n", &Params::new()).is_ok());
        assert!(gate.validate("CALL apoc.create.node($labels, $props)", &params(&["labels", "props"])).is_ok());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = gate()
            .validate_structure("MATCH (n) RETURN n; MATCH (m) DETACH DELETE m")
            .unwrap_err();
        assert_eq!(err, RejectionReason::MultipleStatements);
        // A single trailing separator is fine
        assert!(gate().validate_structure("MATCH (n) RETURN n;").is_ok());
        assert!(gate().validate_structure("MATCH (n) RETURN n; // done").is_ok());
    }

    #[test]
    fn test_too_long_rejected() {
        let gate = QueryGate::new(GateConfig {
            max_query_length: 32,
            ..GateConfig::default()
        });
        let query = format!("MATCH (n) RETURN n{}", " ".repeat(40));
        assert!(matches!(
            gate.validate_structure(&query),
            Err(RejectionReason::TooLong { limit: 32, .. })
        ));
    }

    #[test]
    fn test_empty_and_malformed() {
        assert_eq!(gate().validate_structure("   "), Err(RejectionReason::Empty));
        assert!(matches!(
            gate().validate_structure("MATCH (n) WHERE n.name = $"),
            Err(RejectionReason::Malformed(_))
        ));
    }

    #[test]
    fn test_inline_string_literal_rejected_by_default() {
        let query = "MATCH (n {name: 'Tom'}) RETURN n";
        assert_eq!(gate().validate_structure(query), Err(RejectionReason::InlineLiteral));

        let lenient = QueryGate::new(GateConfig {
            allow_string_literals: true,
            ..GateConfig::default()
        });
        assert!(lenient.validate_structure(query).is_ok());
    }

    #[test]
    fn test_numeric_literals_allowed() {
        assert!(gate().validate_structure("MATCH (n) RETURN n LIMIT 5").is_ok());
        assert!(gate().validate_structure("MATCH p=(a)-[*1..3]->(b) RETURN p").is_ok());
    }

    #[test]
    fn test_missing_parameter_rejected() {
        let err = gate()
            .validate("MATCH (n) WHERE n.id = $x RETURN n", &Params::new())
            .unwrap_err();
        assert_eq!(err, RejectionReason::MissingParameter("x".to_string()));
    }

    #[test]
    fn test_unused_parameter_rejected() {
        let err = gate()
            .validate("MATCH (n) WHERE n.id = $x RETURN n", &params(&["x", "y"]))
            .unwrap_err();
        assert_eq!(err, RejectionReason::UnusedParameter("y".to_string()));
    }

    #[test]
    fn test_bound_parameters_pass() {
        let shape = gate()
            .validate("MATCH (n) WHERE n.id = $x AND n.kind IN $`kinds` RETURN n", &params(&["x", "kinds"]))
            .unwrap();
        assert_eq!(shape.parameters.len(), 2);
    }

    #[test]
    fn test_procedure_allowlist() {
        assert!(gate().validate_structure("CALL db.labels() YIELD label RETURN label").is_ok());
        assert!(gate().validate_structure("CALL db.schema.visualization()").is_ok());

        let err = gate().validate_structure("CALL dbms.killQueries([])").unwrap_err();
        assert_eq!(err, RejectionReason::ProcedureNotAllowed("dbms.killQueries".to_string()));
    }

    #[test]
    fn test_call_subquery_is_checked() {
        assert!(gate()
            .validate_structure("CALL { MATCH (n) RETURN n } RETURN n")
            .is_ok());
        assert!(matches!(
            gate().validate_structure("CALL { MATCH (n) DELETE n }"),
            Err(RejectionReason::WriteClause(_))
        ));
        assert_eq!(
            gate().validate_structure("MATCH (n) CALL { WITH n RETURN n AS m } IN TRANSACTIONS RETURN m"),
            Err(RejectionReason::WriteClause("IN TRANSACTIONS".to_string()))
        );
    }

    /// Every character the graph database treats as a token separator.
    const UNICODE_SEPARATORS: &[char] = &[
        '\u{b}', '\u{c}', '\u{85}', '\u{a0}', '\u{1680}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}',
        '\u{2004}', '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200a}', '\u{2028}',
        '\u{2029}', '\u{202f}', '\u{205f}', '\u{3000}',
    ];

    #[test]
    fn test_unicode_whitespace_does_not_hide_write_clauses() {
        for &sep in UNICODE_SEPARATORS {
            for (query, keyword) in [
                (format!("CREATE{sep}(n) RETURN n"), "CREATE"),
                (format!("MATCH (n){sep}DETACH{sep}DELETE{sep}n"), "DETACH"),
                (format!("MATCH (n){sep}SET{sep}n.x = 1"), "SET"),
                (format!("MATCH (n) WITH n{sep}MERGE (m) RETURN m"), "MERGE"),
            ] {
                assert_eq!(
                    gate().validate(&query, &Params::new()),
                    Err(RejectionReason::WriteClause(keyword.to_string())),
                    "separator {:?}",
                    sep
                );
            }
        }
    }

    #[test]
    fn test_unicode_whitespace_does_not_hide_procedure_calls() {
        for &sep in UNICODE_SEPARATORS {
            let query = format!("CALL{sep}dbms.killQueries([])");
            assert_eq!(
                gate().validate_structure(&query),
                Err(RejectionReason::ProcedureNotAllowed("dbms.killQueries".to_string())),
                "separator {:?}",
                sep
            );
        }
    }

    #[test]
    fn test_invisible_characters_do_not_hide_keywords() {
        for sep in ['\u{200b}', '\u{2060}', '\u{feff}', '\u{1c}'] {
            let query = format!("MATCH (n){sep}DELETE n");
            assert!(
                matches!(gate().validate_structure(&query), Err(RejectionReason::WriteClause(_))),
                "separator {:?}",
                sep
            );
        }
    }

    #[test]
    fn test_unicode_whitespace_in_read_query_is_fine() {
        let query = "MATCH\u{a0}(n:Città)\u{3000}RETURN\u{2009}n.größe";
        assert!(gate().validate_structure(query).is_ok());
    }

    #[test]
    fn test_rejection_codes_are_stable() {
        assert_eq!(RejectionReason::Empty.code(), "EMPTY_QUERY");
        assert_eq!(RejectionReason::InlineLiteral.code(), "INLINE_LITERAL");
        assert_eq!(RejectionReason::UnusedParameter("y".into()).code(), "UNUSED_PARAMETER");
    }
}
