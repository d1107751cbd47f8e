//! Cleans model-produced SQL and enforces the read-only deny-list.
//!
//! It is a textual whole-word deny-list, not a parsed allow-list: a keyword
//! inside a string literal is rejected too, and anything the list does not
//! name (e.g. `PRAGMA`, `ATTACH`) passes. The procurement file is attached
//! read-only underneath it; neither layer alone is a guarantee.

use regex::Regex;

use crate::error::{QueryError, Result};

/// Statements that mutate schema or data.
pub const DISALLOWED_KEYWORDS: &[&str] = &["DROP", "DELETE", "ALTER", "TRUNCATE", "INSERT", "UPDATE"];

lazy_static::lazy_static! {
    static ref SQL_TOKEN: Regex = Regex::new(r"(?i)\bsql\b").expect("static regex");
    static ref SQLQUERY_LABEL: Regex = Regex::new(r"(?i)^\s*SQLQuery:\s*").expect("static regex");
    static ref DENY_LIST: Vec<(&'static str, Regex)> = DISALLOWED_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"(?i)\b{}\b", kw)).expect("static regex")))
        .collect();
}

/// Strip fence/label artifacts, then reject any deny-listed keyword.
///
/// Returns the trimmed statement. The first keyword found (in deny-list
/// order) aborts with [`QueryError::DisallowedKeyword`].
pub fn clean_sql_query(raw: &str) -> Result<String> {
    let sql = raw.replace('`', "");
    let sql = SQL_TOKEN.replace_all(&sql, "");
    let sql = SQLQUERY_LABEL.replace(&sql, "");

    if let Some(keyword) = find_disallowed_keyword(&sql) {
        return Err(QueryError::DisallowedKeyword { keyword: keyword.to_string() });
    }

    Ok(sql.trim().to_string())
}

/// First deny-listed keyword present as a whole word, case-insensitive.
pub fn find_disallowed_keyword(sql: &str) -> Option<&'static str> {
    DENY_LIST
        .iter()
        .find(|(_, re)| re.is_match(sql))
        .map(|(kw, _)| *kw)
}
