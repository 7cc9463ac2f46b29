//! Tool argument types.
//!
//! Each tool's argument map is deserialized into one of these structs; the
//! same structs generate the JSON schemas published by `list_tools`.
//! Connection overrides (`user`, `password`, `dsn`) are flattened into every
//! input.

use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionArgs, DEFAULT_HYBRID_ROW_LIMIT, DEFAULT_ROUTINE_TIMEOUT_MS, DEFAULT_ROW_LIMIT,
    MAX_ROW_LIMIT, QueryParam,
};
use crate::tools::format::OutputFormat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_max_rows() -> u32 {
    DEFAULT_ROW_LIMIT
}

fn default_hybrid_max_rows() -> u32 {
    DEFAULT_HYBRID_ROW_LIMIT
}

fn default_routine_timeout() -> u64 {
    DEFAULT_ROUTINE_TIMEOUT_MS
}

fn default_graph_format() -> String {
    "json".to_string()
}

/// Tools that take nothing but connection overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ConnectionOnlyInput {
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list. Omit to list every schema.
    #[serde(default, alias = "Schema")]
    pub schema: Option<String>,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FilterTablesInput {
    /// Substring to look for in table names
    pub q: String,
    /// Schema to search. Omit to search every schema.
    #[serde(default, alias = "Schema")]
    pub schema: Option<String>,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DescribeTableInput {
    #[serde(alias = "Schema")]
    pub schema: String,
    pub table: String,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryInput {
    /// SQL statement; use :name placeholders for parameters
    pub query: String,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default = "default_max_rows", alias = "max_rows")]
    pub max_rows: u32,
    /// Values for :name placeholders
    #[serde(default)]
    pub params: Option<HashMap<String, QueryParam>>,
    /// Output format: "jsonl" (default), "json" or "markdown"
    #[serde(default)]
    pub format: OutputFormat,
    /// Longest field value, in characters, before truncation. Defaults to the server setting.
    #[serde(default, alias = "max_field_length")]
    pub max_field_length: Option<usize>,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryMarkdownInput {
    /// SQL statement; use :name placeholders for parameters
    pub query: String,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default = "default_max_rows", alias = "max_rows")]
    pub max_rows: u32,
    /// Values for :name placeholders
    #[serde(default)]
    pub params: Option<HashMap<String, QueryParam>>,
    #[serde(default, alias = "max_field_length")]
    pub max_field_length: Option<usize>,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryDatabaseInput {
    /// SQL statement; use :name placeholders for parameters
    pub query: String,
    /// Values for :name placeholders
    #[serde(default)]
    pub params: Option<HashMap<String, QueryParam>>,
    /// Output format: "jsonl" (default), "json" or "markdown"
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default, alias = "max_field_length")]
    pub max_field_length: Option<usize>,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HybridQueryInput {
    /// SQL query with embedded graph patterns
    pub query: String,
    /// Maximum rows to return. Default: 20
    #[serde(default = "default_hybrid_max_rows", alias = "max_rows")]
    pub max_rows: u32,
    /// Timeout in milliseconds. Default: 30000
    #[serde(default = "default_routine_timeout")]
    pub timeout: u64,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GraphQueryInput {
    /// Graph query text
    pub query: String,
    /// Result format understood by the server. Default: "json"
    #[serde(default = "default_graph_format")]
    pub format: String,
    /// Timeout in milliseconds. Default: 30000
    #[serde(default = "default_routine_timeout")]
    pub timeout: u64,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

/// Input for the assistant and graph-query generator tools.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptInput {
    pub prompt: String,
    /// Credential for the assistant service. Defaults to the configured key.
    #[serde(default, alias = "api_key", skip_serializing)]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub connection: ConnectionArgs,
}

/// Fail with a validation error when a required string is blank.
pub(crate) fn require_text(field: &str, value: &str) -> DbResult<()> {
    if value.trim().is_empty() {
        return Err(DbError::validation(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

/// Row caps must be at least one; larger values are clamped to the global maximum.
pub(crate) fn row_cap(field: &str, value: u32) -> DbResult<u32> {
    if value == 0 {
        return Err(DbError::validation(format!("'{}' must be at least 1", field)));
    }
    Ok(value.min(MAX_ROW_LIMIT))
}

pub(crate) fn require_positive(field: &str, value: u64) -> DbResult<()> {
    if value == 0 {
        return Err(DbError::validation(format!("'{}' must be at least 1", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_query_defaults() {
        let input: ExecuteQueryInput = serde_json::from_value(json!({"query": "SELECT 1"})).unwrap();
        assert_eq!(input.max_rows, 100);
        assert_eq!(input.format, OutputFormat::JsonLines);
        assert!(input.params.is_none());
        assert!(input.max_field_length.is_none());
        assert!(input.connection.dsn.is_none());
    }

    #[test]
    fn test_aliases_are_accepted() {
        let input: ExecuteQueryInput = serde_json::from_value(json!({
            "query": "SELECT :a",
            "max_rows": 5,
            "params": {"a": 1},
            "url": "sqlite:x.db",
        }))
        .unwrap();
        assert_eq!(input.max_rows, 5);
        assert_eq!(input.params.unwrap()["a"], QueryParam::Int(1));
        assert_eq!(input.connection.dsn.as_deref(), Some("sqlite:x.db"));

        let tables: ListTablesInput = serde_json::from_value(json!({"Schema": "public"})).unwrap();
        assert_eq!(tables.schema.as_deref(), Some("public"));

        let prompt: PromptInput =
            serde_json::from_value(json!({"prompt": "hi", "api_key": "k"})).unwrap();
        assert_eq!(prompt.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_hybrid_defaults() {
        let input: HybridQueryInput = serde_json::from_value(json!({"query": "q"})).unwrap();
        assert_eq!(input.max_rows, 20);
        assert_eq!(input.timeout, 30000);
        let graph: GraphQueryInput = serde_json::from_value(json!({"query": "q"})).unwrap();
        assert_eq!(graph.format, "json");
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let prompt: PromptInput = serde_json::from_value(json!({
            "prompt": "hi",
            "apiKey": "secret-key",
            "password": "secret-pass",
            "dsn": "postgres://u:hunter2@h/db",
        }))
        .unwrap();
        let text = serde_json::to_string(&prompt).unwrap();
        assert!(!text.contains("secret-key"));
        assert!(!text.contains("secret-pass"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_missing_required_field_fails() {
        assert!(serde_json::from_value::<DescribeTableInput>(json!({"schema": "main"})).is_err());
    }

    #[test]
    fn test_semantic_checks() {
        assert!(require_text("query", "  ").is_err());
        assert!(row_cap("maxRows", 0).is_err());
        assert_eq!(row_cap("maxRows", 50_000).unwrap(), MAX_ROW_LIMIT);
        assert!(require_positive("timeout", 0).is_err());
    }
}
