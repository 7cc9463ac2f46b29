//! The published tool surface: names, descriptions and input schemas.

use crate::tools::inputs::{
    ConnectionOnlyInput, DescribeTableInput, ExecuteQueryInput, ExecuteQueryMarkdownInput,
    FilterTablesInput, GraphQueryInput, HybridQueryInput, ListTablesInput, PromptInput,
    QueryDatabaseInput,
};
use schemars::{JsonSchema, schema_for};
use serde_json::{Map, Value as JsonValue};

/// Every tool the server answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListQualifiers,
    ListSchemas,
    ListTables,
    FilterTables,
    DescribeTable,
    ExecuteQuery,
    ExecuteQueryMarkdown,
    QueryDatabase,
    HybridQuery,
    GraphQuery,
    AssistantQuery,
    GenerateGraphQuery,
    ConnectionInfo,
}

impl ToolName {
    pub const ALL: [ToolName; 13] = [
        Self::ListQualifiers,
        Self::ListSchemas,
        Self::ListTables,
        Self::FilterTables,
        Self::DescribeTable,
        Self::ExecuteQuery,
        Self::ExecuteQueryMarkdown,
        Self::QueryDatabase,
        Self::HybridQuery,
        Self::GraphQuery,
        Self::AssistantQuery,
        Self::GenerateGraphQuery,
        Self::ConnectionInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListQualifiers => "listQualifiers",
            Self::ListSchemas => "listSchemas",
            Self::ListTables => "listTables",
            Self::FilterTables => "filterTables",
            Self::DescribeTable => "describeTable",
            Self::ExecuteQuery => "executeQuery",
            Self::ExecuteQueryMarkdown => "executeQueryMarkdown",
            Self::QueryDatabase => "queryDatabase",
            Self::HybridQuery => "hybridQuery",
            Self::GraphQuery => "graphQuery",
            Self::AssistantQuery => "assistantQuery",
            Self::GenerateGraphQuery => "generateGraphQuery",
            Self::ConnectionInfo => "connectionInfo",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ListQualifiers => {
                "List catalogs (databases) visible on the server.\nEmpty on backends without a catalog level (MySQL, SQLite)."
            }
            Self::ListSchemas => "List schema names in the order the database reports them.",
            Self::ListTables => {
                "List tables and views. Returns an object, not a bare array: \
                 {\"tables\": [{catalog?, schema, table, type}], \"skipped\": [{schema, error}]}.\n\
                 Omit `schema` to list every schema; schemas that cannot be read are reported in `skipped` \
                 and `tables` still holds everything that could be listed."
            }
            Self::FilterTables => {
                "List tables whose name contains `q`.\nCase-sensitive on PostgreSQL, case-insensitive on MySQL and SQLite."
            }
            Self::DescribeTable => {
                "Describe a table: columns (type, nullable, default, autoincrement, primary key), primary key and foreign keys."
            }
            Self::ExecuteQuery => {
                "Execute a SQL statement and return up to `maxRows` rows.\nBind values with :name placeholders and `params`.\nOutput format: jsonl (default), json or markdown. Long fields are truncated with a marker."
            }
            Self::ExecuteQueryMarkdown => {
                "Execute a SQL statement and return up to `maxRows` rows as a markdown table."
            }
            Self::QueryDatabase => {
                "Execute a SQL statement and return all rows, up to 10000.\nOutput format: jsonl (default), json or markdown."
            }
            Self::HybridQuery => {
                "Run a SQL query with embedded graph patterns through the server's hybrid query routine."
            }
            Self::GraphQuery => "Run a graph query through the server's graph query routine.",
            Self::AssistantQuery => "Ask the server's support assistant routine a question.",
            Self::GenerateGraphQuery => {
                "Draft a graph query from a natural-language prompt using the server's generator routine."
            }
            Self::ConnectionInfo => {
                "Report the backend, server version, host, database and user for the resolved connection."
            }
        }
    }

    /// JSON schema of the tool's arguments.
    pub fn input_schema(&self) -> Map<String, JsonValue> {
        match self {
            Self::ListQualifiers | Self::ListSchemas | Self::ConnectionInfo => {
                schema_object::<ConnectionOnlyInput>()
            }
            Self::ListTables => schema_object::<ListTablesInput>(),
            Self::FilterTables => schema_object::<FilterTablesInput>(),
            Self::DescribeTable => schema_object::<DescribeTableInput>(),
            Self::ExecuteQuery => schema_object::<ExecuteQueryInput>(),
            Self::ExecuteQueryMarkdown => schema_object::<ExecuteQueryMarkdownInput>(),
            Self::QueryDatabase => schema_object::<QueryDatabaseInput>(),
            Self::HybridQuery => schema_object::<HybridQueryInput>(),
            Self::GraphQuery => schema_object::<GraphQueryInput>(),
            Self::AssistantQuery | Self::GenerateGraphQuery => schema_object::<PromptInput>(),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn schema_object<T: JsonSchema>() -> Map<String, JsonValue> {
    match schema_for!(T).to_value() {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}
