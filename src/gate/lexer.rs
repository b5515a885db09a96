//! Minimal Cypher lexer for static inspection.
//!
//! Only distinguishes what the gate needs: words, quoted names, string and
//! number literals, parameters, statement separators and single-character
//! punctuation. Comments and whitespace are dropped.
//!
//! Whitespace is any Unicode `White_Space` character, since the graph
//! database accepts all of them between tokens. Identifiers are built from
//! alphanumeric characters and `_` only; every other character outside a
//! literal, quoted name or comment is a punctuation lexeme of its own, so a
//! keyword can never be glued to an unusual separator.

/// Kind of lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexemeKind {
    /// Bare identifier or keyword.
    Word,
    /// Backtick-quoted identifier (text excludes the backticks).
    QuotedName,
    /// Single- or double-quoted string literal (text includes quotes).
    StringLiteral,
    /// Numeric literal.
    Number,
    /// Parameter reference (text is the name without `$`).
    Parameter,
    /// `;`
    Semicolon,
    /// Any other character outside literals and comments.
    Punct(char),
}

/// A lexeme borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'a> {
    /// Kind of lexeme.
    pub kind: LexemeKind,
    /// Text of the lexeme (see [`LexemeKind`] for what is included).
    pub text: &'a str,
    /// Byte offset in the source.
    pub offset: usize,
}

impl Lexeme<'_> {
    /// Whether this is the given punctuation character.
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == LexemeKind::Punct(c)
    }

    /// Whether this is a bare word equal to `keyword`, ignoring ASCII case.
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == LexemeKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Lexing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// String literal without closing quote.
    #[error("unterminated string literal at byte {0}")]
    UnterminatedString(usize),
    /// Block comment without `*/`.
    #[error("unterminated comment at byte {0}")]
    UnterminatedComment(usize),
    /// Backtick-quoted name without closing backtick.
    #[error("unterminated quoted name at byte {0}")]
    UnterminatedQuotedName(usize),
    /// `$` not followed by a name.
    #[error("empty parameter name at byte {0}")]
    EmptyParameter(usize),
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Index just past the identifier characters starting at `i`.
fn scan_ident(src: &str, i: usize) -> usize {
    src[i..]
        .char_indices()
        .find(|&(_, c)| !is_ident_char(c))
        .map_or(src.len(), |(offset, _)| i + offset)
}

/// Scan a backtick-quoted name starting at `start` (the opening backtick).
/// A doubled backtick inside the name is an escaped backtick.
/// Returns the index just past the closing backtick.
fn scan_quoted_name(bytes: &[u8], start: usize) -> Result<usize, LexError> {
    let mut i = start + 1;
    loop {
        match bytes.get(i) {
            None => return Err(LexError::UnterminatedQuotedName(start)),
            Some(b'`') if bytes.get(i + 1) == Some(&b'`') => i += 2,
            Some(b'`') => return Ok(i + 1),
            Some(_) => i += 1,
        }
    }
}

/// Tokenize Cypher source text.
pub fn tokenize(src: &str) -> Result<Vec<Lexeme<'_>>, LexError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let start = i;

        if !b.is_ascii() {
            let Some(c) = src[i..].chars().next() else {
                break;
            };
            i += c.len_utf8();
            if c.is_whitespace() {
                continue;
            }
            if is_ident_char(c) {
                i = scan_ident(src, i);
                out.push(Lexeme {
                    kind: LexemeKind::Word,
                    text: &src[start..i],
                    offset: start,
                });
            } else {
                out.push(Lexeme {
                    kind: LexemeKind::Punct(c),
                    text: &src[start..i],
                    offset: start,
                });
            }
            continue;
        }

        match b {
            _ if char::from(b).is_whitespace() => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let body = &src[i + 2..];
                match body.find("*/") {
                    Some(end) => i += 2 + end + 2,
                    None => return Err(LexError::UnterminatedComment(start)),
                }
            }
            b'\'' | b'"' => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => return Err(LexError::UnterminatedString(start)),
                        Some(b'\\') => i += 2,
                        Some(&c) if c == b => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                out.push(Lexeme {
                    kind: LexemeKind::StringLiteral,
                    text: &src[start..i],
                    offset: start,
                });
            }
            b'`' => {
                i = scan_quoted_name(bytes, start)?;
                out.push(Lexeme {
                    kind: LexemeKind::QuotedName,
                    text: &src[start + 1..i - 1],
                    offset: start,
                });
            }
            b'$' => {
                i += 1;
                let text = if bytes.get(i) == Some(&b'`') {
                    let name_start = i;
                    i = scan_quoted_name(bytes, name_start)?;
                    &src[name_start + 1..i - 1]
                } else {
                    let name_start = i;
                    i = scan_ident(src, i);
                    &src[name_start..i]
                };
                if text.is_empty() {
                    return Err(LexError::EmptyParameter(start));
                }
                out.push(Lexeme {
                    kind: LexemeKind::Parameter,
                    text,
                    offset: start,
                });
            }
            b';' => {
                i += 1;
                out.push(Lexeme {
                    kind: LexemeKind::Semicolon,
                    text: ";",
                    offset: start,
                });
            }
            _ if b.is_ascii_digit() => {
                i = scan_ident(src, i);
                // Fraction, but not the `..` of a variable-length pattern
                if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    i = scan_ident(src, i + 1);
                }
                out.push(Lexeme {
                    kind: LexemeKind::Number,
                    text: &src[start..i],
                    offset: start,
                });
            }
            _ if b.is_ascii_alphanumeric() || b == b'_' => {
                i = scan_ident(src, i);
                out.push(Lexeme {
                    kind: LexemeKind::Word,
                    text: &src[start..i],
                    offset: start,
                });
            }
            _ => {
                i += 1;
                out.push(Lexeme {
                    kind: LexemeKind::Punct(b as char),
                    text: &src[start..i],
                    offset: start,
                });
            }
        }
    }

    Ok(out)
}
