//! SELECT-only gate for generated SQL.
//!
//! This is a prefix allow-list, not a parser. A single `SELECT` can still
//! carry constructs that write on engines that allow them (for instance a
//! data-modifying CTE nested in a subquery). The executor opens read-only
//! sessions to cover that gap at the database level.

use std::fmt;

use thiserror::Error;

/// A candidate that passed the gate and may be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    sql: String,
}

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Why a candidate was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("query is empty")]
    Empty,

    #[error("query does not start with SELECT")]
    NotSelect,

    #[error("multiple statements are not allowed")]
    MultipleStatements,

    #[error("SELECT INTO is not allowed")]
    SelectInto,
}

/// Check a candidate query and wrap it as a [`ValidatedQuery`].
///
/// The query is trimmed; trailing semicolons and comments are allowed.
pub fn validate(sql: &str) -> Result<ValidatedQuery, RejectionReason> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(RejectionReason::Empty);
    }

    if !starts_with_keyword(trimmed, "SELECT") {
        return Err(RejectionReason::NotSelect);
    }

    let tokens = scan(trimmed);

    // A separator followed by any code starts a second statement.
    if tokens.semicolons.iter().any(|&pos| pos < tokens.last_code) {
        return Err(RejectionReason::MultipleStatements);
    }

    if tokens.words.iter().any(|w| w.eq_ignore_ascii_case("INTO")) {
        return Err(RejectionReason::SelectInto);
    }

    Ok(ValidatedQuery {
        sql: trimmed.to_string(),
    })
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let Some(head) = sql.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    sql[keyword.len()..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '$'))
}

/// Code-level view of a query: bare words and statement separators that
/// are not inside literals, quoted identifiers or comments.
#[derive(Debug, Default)]
struct Tokens<'a> {
    words: Vec<&'a str>,
    semicolons: Vec<usize>,
    /// Start of the last token that is neither a separator nor a comment.
    last_code: usize,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit() || b == b'$'
}

fn scan(sql: &str) -> Tokens<'_> {
    let bytes = sql.as_bytes();
    let mut tokens = Tokens::default();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b';' => {
                tokens.semicolons.push(i);
                i += 1;
            }
            b if b.is_ascii_whitespace() => i += 1,
            b'\'' => {
                tokens.last_code = i;
                i = skip_quoted(bytes, i, b'\'');
            }
            b'"' => {
                tokens.last_code = i;
                i = skip_quoted(bytes, i, b'"');
            }
            b'$' => {
                tokens.last_code = i;
                i = skip_dollar_quoted(sql, i);
            }
            b if is_ident_start(b) => {
                tokens.last_code = i;
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let word = &sql[start..i];
                // E'...' strings honour backslash escapes.
                if word.eq_ignore_ascii_case("e") && bytes.get(i) == Some(&b'\'') {
                    i = skip_escaped(bytes, i);
                } else {
                    tokens.words.push(word);
                }
            }
            b if b.is_ascii_digit() => {
                tokens.last_code = i;
                // Numbers, including forms like 1e5, never start a quote.
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
            }
            _ => {
                tokens.last_code = i;
                i += 1;
            }
        }
    }

    tokens
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    // PostgreSQL block comments nest.
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Skip a quoted run starting at `start`; a doubled quote is an escape.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Skip an escape string literal whose opening quote is at `start`.
/// Both `\'` and `''` are escaped quotes.
fn skip_escaped(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip a PostgreSQL dollar-quoted string (`$$...$$` or `$tag$...$tag$`).
/// A `$` that does not open a quote (a positional parameter) is stepped over.
fn skip_dollar_quoted(sql: &str, start: usize) -> usize {
    let rest = &sql[start + 1..];
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    // Tags cannot start with a digit: `$1` is a parameter.
    if rest.starts_with(|c: char| c.is_ascii_digit()) || !rest[tag_len..].starts_with('$') {
        return start + 1;
    }
    let delimiter = &sql[start..start + tag_len + 2];
    let body_start = start + delimiter.len();
    match sql[body_start..].find(delimiter) {
        Some(end) => body_start + end + delimiter.len(),
        None => sql.len(),
    }
}
