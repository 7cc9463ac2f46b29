//! MCP tool implementations.
//!
//! - `catalog`: tool names, descriptions and input schemas
//! - `inputs`: argument types with defaults and aliases
//! - `dispatch`: per-call validation, routing and the call envelope
//! - `format`: result rendering (json, jsonl, markdown)

pub mod catalog;
pub mod dispatch;
pub mod format;
pub mod inputs;

pub use catalog::ToolName;
pub use dispatch::{
    CallState, DispatcherSettings, ToolCallEnvelope, ToolDispatcher, ToolOutcome,
};
pub use format::{OutputFormat, render};
