//! SQL Tool Server Library
//!
//! MCP (Model Context Protocol) tools for AI assistants to inspect and query
//! SQL databases (SQLite, PostgreSQL, MySQL/MariaDB). Every tool call opens
//! its own connection from per-call or configured credentials and closes it
//! before returning.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
pub use tools::ToolDispatcher;
