//! Data models for the SQL tool server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    ConnectionArgs, ConnectionDefaults, ConnectionInfo, ConnectionSpec, DatabaseType,
    FALLBACK_API_KEY, FALLBACK_PASSWORD, FALLBACK_USER, mask_url,
};
pub use query::{
    DEFAULT_HYBRID_ROW_LIMIT, DEFAULT_MAX_FIELD_LENGTH, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_ROUTINE_TIMEOUT_MS, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryParam, ResultSet,
    TruncatedField,
};
pub use schema::{
    ColumnDescriptor, ForeignKey, PrimaryKey, SkippedSchema, TableDefinition, TableDescriptor,
    TableListing, TableType,
};
