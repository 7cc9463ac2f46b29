//! Query execution engine.
//!
//! This module provides query execution functionality with support for:
//! - Named parameters rewritten to the backend's positional form
//! - Row limits (enforced via streaming - only fetches needed rows)
//! - Field length limits with in-band truncation markers
//! - Statement timeouts

use crate::db::params::to_positional;
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_MAX_FIELD_LENGTH, DEFAULT_QUERY_TIMEOUT_SECS, QueryParam, ResultSet, TruncatedField,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// One ad-hoc statement and its limits.
#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub sql: &'a str,
    /// `None` is the same as an empty map; placeholders still need values
    pub params: Option<&'a HashMap<String, QueryParam>>,
    pub max_rows: usize,
    pub max_field_length: usize,
}

/// Query executor that handles database query execution.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    statement_timeout: Duration,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            statement_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(statement_timeout: Duration) -> Self {
        Self { statement_timeout }
    }

    /// Execute a statement on the call's session and return capped results.
    pub async fn execute(
        &self,
        session: &mut dyn Session,
        request: &QueryRequest<'_>,
    ) -> DbResult<ResultSet> {
        let start = Instant::now();
        let no_params = HashMap::new();
        let named = request.params.unwrap_or(&no_params);
        let statement = to_positional(request.sql, named, session.backend())?;

        debug!(
            sql = %statement.sql,
            params = statement.params.len(),
            max_rows = request.max_rows,
            "Executing query"
        );

        let fetched = timeout(self.statement_timeout, async {
            let mut fetched = session
                .fetch(&statement.sql, &statement.params, request.max_rows)
                .await?;
            if fetched.columns.is_empty() {
                // No rows came back; the statement may still have a row shape
                match session.describe_columns(&statement.sql).await {
                    Ok(columns) => fetched.columns = columns,
                    Err(e) => debug!(error = %e, "Statement description unavailable"),
                }
            }
            Ok::<_, DbError>(fetched)
        })
        .await
        .map_err(|_| {
            DbError::timeout("query", self.statement_timeout.as_millis() as u64)
        })??;

        let mut result = ResultSet::new(fetched.columns, fetched.rows);
        truncate_fields(&mut result, request.max_field_length);

        if !result.truncated_fields.is_empty() {
            warn!(
                fields = result.truncated_fields.len(),
                max_field_length = request.max_field_length,
                "Oversized fields truncated"
            );
        }
        debug!(
            rows = result.row_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(result)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker appended to a truncated field; `original_length` is in characters.
pub fn truncation_marker(original_length: usize) -> String {
    format!("…[truncated, {} chars]", original_length)
}

/// Cut every field whose rendered text is longer than `max_len` characters.
pub fn truncate_fields(result: &mut ResultSet, max_len: usize) {
    let max_len = if max_len == 0 {
        DEFAULT_MAX_FIELD_LENGTH
    } else {
        max_len
    };

    for (row_idx, row) in result.rows.iter_mut().enumerate() {
        for (col_idx, value) in row.iter_mut().enumerate() {
            if let Some(original_length) = truncate_value(value, max_len) {
                result.truncated_fields.push(TruncatedField {
                    row: row_idx,
                    column: col_idx,
                    original_length,
                });
            }
        }
    }
}

fn truncate_value(value: &mut JsonValue, max_len: usize) -> Option<usize> {
    let text = match &mut *value {
        JsonValue::Null => return None,
        JsonValue::String(s) => std::mem::take(s),
        other => other.to_string(),
    };

    let length = text.chars().count();
    if length <= max_len {
        if let JsonValue::String(s) = value {
            *s = text;
        }
        return None;
    }

    let mut cut: String = text.chars().take(max_len).collect();
    cut.push_str(&truncation_marker(length));
    *value = JsonValue::String(cut);
    Some(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::session::{FetchedRows, SessionEndpoint};
    use crate::models::{
        ColumnDescriptor, DatabaseType, ForeignKey, PrimaryKey, TableDescriptor,
    };
    use async_trait::async_trait;
    use serde_json::json;

    /// Returns one fixed row from `fetch` after `delay`.
    struct SlowSession {
        delay: Duration,
        fetched: Vec<String>,
    }

    #[async_trait]
    impl Session for SlowSession {
        fn backend(&self) -> DatabaseType {
            DatabaseType::SQLite
        }

        fn endpoint(&self) -> SessionEndpoint {
            SessionEndpoint {
                host: None,
                database: None,
                user: None,
            }
        }

        async fn server_version(&mut self) -> DbResult<String> {
            Ok("test".to_string())
        }

        async fn list_catalogs(&mut self) -> DbResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn list_schemas(&mut self) -> DbResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn list_tables(&mut self, _: &str) -> DbResult<Vec<TableDescriptor>> {
            Ok(Vec::new())
        }

        async fn columns(&mut self, _: &str, _: &str) -> DbResult<Vec<ColumnDescriptor>> {
            Ok(Vec::new())
        }

        async fn primary_key(&mut self, _: &str, _: &str) -> DbResult<Option<PrimaryKey>> {
            Ok(None)
        }

        async fn foreign_keys(&mut self, _: &str, _: &str) -> DbResult<Vec<ForeignKey>> {
            Ok(Vec::new())
        }

        async fn fetch(&mut self, sql: &str, _: &[QueryParam], _: usize) -> DbResult<FetchedRows> {
            self.fetched.push(sql.to_string());
            tokio::time::sleep(self.delay).await;
            Ok(FetchedRows {
                columns: vec!["x".to_string()],
                rows: vec![vec![json!(1)]],
            })
        }

        async fn describe_columns(&mut self, _: &str) -> DbResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn close(self: Box<Self>) -> DbResult<()> {
            Ok(())
        }
    }

    fn request(sql: &str) -> QueryRequest<'_> {
        QueryRequest {
            sql,
            params: None,
            max_rows: 10,
            max_field_length: 100,
        }
    }

    #[tokio::test]
    async fn test_slow_statement_times_out() {
        let mut session = SlowSession {
            delay: Duration::from_secs(5),
            fetched: Vec::new(),
        };
        let executor = QueryExecutor::with_timeout(Duration::from_millis(10));
        let err = executor
            .execute(&mut session, &request("SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Timeout { elapsed_ms: 10, .. }));
    }

    #[tokio::test]
    async fn test_fast_statement_completes_within_timeout() {
        let mut session = SlowSession {
            delay: Duration::ZERO,
            fetched: Vec::new(),
        };
        let executor = QueryExecutor::with_timeout(Duration::from_secs(5));
        let result = executor
            .execute(&mut session, &request("SELECT 1"))
            .await
            .unwrap();
        assert_eq!(result.row_count(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_without_params_fails_before_fetch() {
        let mut session = SlowSession {
            delay: Duration::ZERO,
            fetched: Vec::new(),
        };
        let err = QueryExecutor::new()
            .execute(&mut session, &request("SELECT :missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));
        assert!(session.fetched.is_empty());
    }

    #[test]
    fn test_short_fields_untouched() {
        let mut result = ResultSet::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![json!("short"), json!(12345), json!(false)]],
        );
        truncate_fields(&mut result, 5);
        assert_eq!(result.rows[0], vec![json!("short"), json!(12345), json!(false)]);
        assert!(result.truncated_fields.is_empty());
    }

    #[test]
    fn test_numbers_and_booleans_are_truncated_as_text() {
        let mut result = ResultSet::new(
            vec!["n".into(), "b".into()],
            vec![vec![json!(12345678901_i64), json!(true)]],
        );
        truncate_fields(&mut result, 3);
        assert_eq!(
            result.rows[0],
            vec![
                json!(format!("123{}", truncation_marker(11))),
                json!(format!("tru{}", truncation_marker(4))),
            ]
        );
        assert_eq!(result.truncated_fields.len(), 2);
        assert_eq!(result.truncated_fields[1].column, 1);
    }

    #[test]
    fn test_long_string_gets_marker() {
        let mut result = ResultSet::new(vec!["a".into()], vec![vec![json!("é".repeat(12))]]);
        truncate_fields(&mut result, 4);
        assert_eq!(
            result.rows[0][0],
            json!(format!("éééé{}", truncation_marker(12)))
        );
        assert_eq!(
            result.truncated_fields,
            vec![TruncatedField {
                row: 0,
                column: 0,
                original_length: 12
            }]
        );
    }

    #[test]
    fn test_nested_json_is_measured_as_text() {
        let mut result = ResultSet::new(
            vec!["doc".into()],
            vec![vec![json!({"key": "a long enough value"})]],
        );
        truncate_fields(&mut result, 10);
        let text = result.rows[0][0].as_str().unwrap();
        assert!(text.starts_with("{\"key\":\"a"));
        assert!(text.ends_with("chars]"));
    }

    #[test]
    fn test_null_is_never_truncated() {
        let mut result = ResultSet::new(vec!["n".into()], vec![vec![JsonValue::Null]]);
        truncate_fields(&mut result, 1);
        assert_eq!(result.rows[0][0], JsonValue::Null);
    }
}
