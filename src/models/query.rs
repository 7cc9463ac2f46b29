//! Query-related data models.
//!
//! This module defines bound parameter values and the `ResultSet` produced by
//! the query executor.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row cap for ad-hoc queries.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Default row cap for hybrid queries.
pub const DEFAULT_HYBRID_ROW_LIMIT: u32 = 20;

/// Upper bound for any row cap, including uncapped `queryDatabase` calls.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default timeout for stored-routine calls in milliseconds.
pub const DEFAULT_ROUTINE_TIMEOUT_MS: u64 = 30000;

/// Default cap on a single field's rendered length, in characters.
pub const DEFAULT_MAX_FIELD_LENGTH: usize = 4096;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl QueryParam {
    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// A field that was cut to the configured maximum length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncatedField {
    pub row: usize,
    pub column: usize,
    /// Length in characters before truncation
    pub original_length: usize,
}

/// Rows returned by a statement, in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub truncated_fields: Vec<TruncatedField>,
}

impl ResultSet {
    /// Build a result set, disambiguating duplicate column names.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns: unique_column_names(columns),
            rows,
            truncated_fields: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }
}

/// Rename repeated column names to `name_2`, `name_3`, ... so records keyed by
/// column name keep every field.
pub fn unique_column_names(columns: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(columns.len());
    for name in columns {
        let mut candidate = name.clone();
        let mut suffix = 2;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_deserialize_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 42, 1.5, "text", [1, 2], {"a": 1}]"#).unwrap();
        let names: Vec<_> = params.iter().map(QueryParam::type_name).collect();
        assert_eq!(
            names,
            vec!["null", "bool", "int", "float", "string", "json", "json"]
        );
    }

    #[test]
    fn test_unique_column_names() {
        let cols = unique_column_names(vec![
            "id".to_string(),
            "name".to_string(),
            "id".to_string(),
            "id".to_string(),
        ]);
        assert_eq!(cols, vec!["id", "name", "id_2", "id_3"]);
    }

    #[test]
    fn test_unique_column_names_avoids_existing_suffix() {
        let cols = unique_column_names(vec![
            "id".to_string(),
            "id_2".to_string(),
            "id".to_string(),
        ]);
        assert_eq!(cols, vec!["id", "id_2", "id_3"]);
    }

    #[test]
    fn test_empty_result_set() {
        let result = ResultSet::default();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
    }
}
