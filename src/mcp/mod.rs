//! MCP server integration module.
//!
//! This module connects the MCP protocol to the tool dispatcher using the
//! rmcp framework.

pub mod service;

pub use service::DbService;
