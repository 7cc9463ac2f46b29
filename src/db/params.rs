//! Parameter binding utilities for database queries.
//!
//! Statements use named placeholders (`:name`). Before execution they are
//! rewritten into the backend's positional form and the values are ordered to
//! match, then bound with the functions below. Values are never interpolated
//! into the SQL text.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::collections::HashMap;

/// A statement in positional form with its values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

/// Rewrite `:name` placeholders to positional ones for `backend`.
///
/// Placeholders inside string literals, quoted identifiers and comments are
/// left alone, as are `::` casts. Every placeholder needs a value and every
/// value needs a placeholder. The driver's own markers (`?`, and `@x`/`$x` on
/// SQLite) are rejected since nothing would be bound to them.
pub fn to_positional(
    sql: &str,
    named: &HashMap<String, QueryParam>,
    backend: DatabaseType,
) -> DbResult<PositionalStatement> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut params = Vec::new();
    // PostgreSQL reuses one `$n` for repeated names
    let mut numbered: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i, c, backend);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_seq(&chars, i + 2, &['*', '/'])
                    .map(|p| p + 2)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' if backend == DatabaseType::PostgreSQL => {
                let end = skip_dollar_quoted(&chars, i).unwrap_or(i + 1);
                out.extend(&chars[i..end]);
                i = end;
            }
            '?' if backend != DatabaseType::PostgreSQL => {
                return Err(positional_marker_error("?"));
            }
            '$' | '@'
                if backend == DatabaseType::SQLite
                    && chars.get(i + 1).is_some_and(|&n| is_word(n)) =>
            {
                return Err(positional_marker_error(&c.to_string()));
            }
            ':' if is_placeholder_start(&chars, i) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_word(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let value = named.get(&name).ok_or_else(|| {
                    DbError::query(
                        format!("No value supplied for parameter :{}", name),
                        None,
                        "Add the parameter to params or remove the placeholder",
                    )
                })?;

                if backend == DatabaseType::PostgreSQL {
                    let position = match numbered.iter().position(|n| *n == name) {
                        Some(p) => p + 1,
                        None => {
                            numbered.push(name);
                            params.push(value.clone());
                            numbered.len()
                        }
                    };
                    out.push('$');
                    out.push_str(&position.to_string());
                } else {
                    out.push('?');
                    params.push(value.clone());
                    numbered.push(name);
                }
                i = end;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    let mut unused: Vec<&str> = named
        .keys()
        .filter(|k| !numbered.contains(k))
        .map(String::as_str)
        .collect();
    if !unused.is_empty() {
        unused.sort_unstable();
        return Err(DbError::query(
            format!(
                "Parameters not referenced by the statement: {}",
                unused.join(", ")
            ),
            None,
            "Remove the unused parameters or reference them as :name",
        ));
    }

    Ok(PositionalStatement { sql: out, params })
}

/// Driver-native markers would be bound to NULL without a value.
fn positional_marker_error(marker: &str) -> DbError {
    DbError::query(
        format!("Unsupported placeholder '{}'", marker),
        None,
        "Use :name placeholders and pass values in params",
    )
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `:name` not preceded by `:`, a word character or a backslash, and not
/// followed by another `:`.
fn is_placeholder_start(chars: &[char], i: usize) -> bool {
    let next_is_word = chars.get(i + 1).is_some_and(|&c| is_word(c));
    if !next_is_word {
        return false;
    }
    if i > 0 {
        let prev = chars[i - 1];
        if prev == ':' || prev == '\\' || is_word(prev) {
            return false;
        }
    }
    let mut end = i + 1;
    while end < chars.len() && is_word(chars[end]) {
        end += 1;
    }
    chars.get(end) != Some(&':')
}

/// Index just past the closing quote; a doubled quote is an escape.
///
/// Only MySQL also treats a backslash as an escape inside `'...'`.
fn skip_quoted(chars: &[char], start: usize, quote: char, backend: DatabaseType) -> usize {
    let backslash_escapes = quote == '\'' && backend == DatabaseType::MySQL;
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        if chars[i] == '\\' && backslash_escapes {
            i += 2;
            continue;
        }
        i += 1;
    }
    chars.len()
}

fn find_seq(chars: &[char], from: usize, seq: &[char]) -> Option<usize> {
    if from > chars.len() {
        return None;
    }
    chars[from..]
        .windows(seq.len())
        .position(|w| w == seq)
        .map(|p| from + p)
}

/// `$tag$ ... $tag$` bodies. Returns `None` when `$` does not open one.
fn skip_dollar_quoted(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if chars.get(j) != Some(&'$') {
        return None;
    }
    // `$1` is a positional parameter, not a tag
    if chars.get(start + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    let tag = &chars[start..=j];
    let close = find_seq(chars, j + 1, tag)?;
    Some(close + tag.len())
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // SQLite doesn't have native JSON type, store as string
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(pairs: &[(&str, QueryParam)]) -> HashMap<String, QueryParam> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_postgres_numbers_and_reuses_placeholders() {
        let params = named(&[("id", QueryParam::Int(7)), ("name", "x".into())]);
        let stmt = to_positional(
            "SELECT * FROM t WHERE id = :id AND name = :name OR parent = :id",
            &params,
            DatabaseType::PostgreSQL,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t WHERE id = $1 AND name = $2 OR parent = $1"
        );
        assert_eq!(stmt.params, vec![QueryParam::Int(7), "x".into()]);
    }

    #[test]
    fn test_question_marks_repeat_values() {
        let params = named(&[("id", QueryParam::Int(7))]);
        let stmt = to_positional(
            "SELECT :id, :id",
            &params,
            DatabaseType::MySQL,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT ?, ?");
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_ignores_casts_literals_and_comments() {
        let params = named(&[("v", "a".into())]);
        let sql = "SELECT ':skip', \"col:x\", x::text -- :nope\n FROM t /* :gone */ WHERE a = :v";
        let stmt = to_positional(sql, &params, DatabaseType::PostgreSQL).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT ':skip', \"col:x\", x::text -- :nope\n FROM t /* :gone */ WHERE a = $1"
        );
    }

    #[test]
    fn test_dollar_quoted_body_is_opaque() {
        let params = named(&[("v", QueryParam::Int(1))]);
        let sql = "SELECT $fn$ :inside $fn$, :v";
        let stmt = to_positional(sql, &params, DatabaseType::PostgreSQL).unwrap();
        assert_eq!(stmt.sql, "SELECT $fn$ :inside $fn$, $1");
    }

    #[test]
    fn test_missing_value_is_query_error() {
        let err = to_positional("SELECT :absent", &HashMap::new(), DatabaseType::SQLite)
            .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.to_string().contains(":absent"));
    }

    #[test]
    fn test_native_markers_are_rejected() {
        for (sql, backend) in [
            ("SELECT ?", DatabaseType::SQLite),
            ("SELECT ?", DatabaseType::MySQL),
            ("SELECT @x", DatabaseType::SQLite),
            ("SELECT $x", DatabaseType::SQLite),
        ] {
            let err = to_positional(sql, &HashMap::new(), backend).unwrap_err();
            assert!(matches!(err, DbError::Query { .. }), "{}", sql);
        }
        // jsonb key-exists operator
        let stmt = to_positional("SELECT doc ? 'k' FROM t", &HashMap::new(), DatabaseType::PostgreSQL)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT doc ? 'k' FROM t");
        let stmt =
            to_positional("SELECT '?', @v", &HashMap::new(), DatabaseType::MySQL).unwrap();
        assert_eq!(stmt.sql, "SELECT '?', @v");
    }

    #[test]
    fn test_unused_value_is_query_error() {
        let params = named(&[("extra", QueryParam::Int(1))]);
        let err = to_positional("SELECT 1", &params, DatabaseType::SQLite).unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_backslash_ends_literal_outside_mysql() {
        let params = named(&[("v", "x".into())]);
        let stmt = to_positional("SELECT 'C:\\' || :v", &params, DatabaseType::PostgreSQL)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT 'C:\\' || $1");
        let stmt =
            to_positional("SELECT 'C:\\' || :v", &params, DatabaseType::SQLite).unwrap();
        assert_eq!(stmt.sql, "SELECT 'C:\\' || ?");
    }

    #[test]
    fn test_mysql_backslash_escapes_quote() {
        let params = named(&[("v", "x".into())]);
        let stmt =
            to_positional("SELECT 'it\\'s :lit', :v", &params, DatabaseType::MySQL).unwrap();
        assert_eq!(stmt.sql, "SELECT 'it\\'s :lit', ?");
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_assignment_and_word_prefix_are_not_placeholders() {
        let stmt = to_positional(
            "SELECT @x := 1, arr[1:2]",
            &HashMap::new(),
            DatabaseType::MySQL,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT @x := 1, arr[1:2]");
    }
}
