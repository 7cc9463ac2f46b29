//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Per-call sessions and the sqlx connection factory
//! - Backend catalog queries and metadata normalization
//! - Query execution with row and field limits
//! - Stored-routine calls
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod bridge;
pub mod catalog;
pub mod connection;
pub mod executor;
pub mod params;
pub mod schema;
pub mod session;
pub mod types;

pub use bridge::{ExtensionBridge, RoutineCatalog};
pub use connection::{SqlxConnection, SqlxConnectionFactory, SqlxSession};
pub use executor::{QueryExecutor, QueryRequest};
pub use schema::MetadataIntrospector;
pub use session::{
    ConnectionFactory, FetchedRows, RoutineCall, Session, SessionEndpoint, SessionGuard,
};
