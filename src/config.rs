//! Configuration handling for the SQL tool server.
//!
//! Settings come from CLI arguments and environment variables. They form the
//! configuration tier of connection resolution: per-call arguments win over
//! them, and they win over the built-in fallbacks.

use crate::db::RoutineCatalog;
use crate::db::bridge::{
    DEFAULT_ASSISTANT_ROUTINE, DEFAULT_GRAPH_GENERATOR_ROUTINE, DEFAULT_GRAPH_ROUTINE,
    DEFAULT_HYBRID_ROUTINE,
};
use crate::models::{
    ConnectionDefaults, DEFAULT_MAX_FIELD_LENGTH, DEFAULT_QUERY_TIMEOUT_SECS, mask_url,
};
use crate::tools::DispatcherSettings;
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// A named DSN from `--dsn name=url`.
#[derive(Clone, PartialEq, Eq)]
pub struct DsnEntry {
    pub name: String,
    /// Full connection URL (sensitive - not logged).
    pub url: String,
}

impl DsnEntry {
    /// Parse `name=url`. The name ends at the first `=` before the scheme
    /// separator, so query strings in the URL keep their own `=` signs.
    pub fn parse(s: &str) -> Result<Self, String> {
        let scheme_pos = s.find("://").unwrap_or(s.len());
        let Some(idx) = s[..scheme_pos].find('=') else {
            return Err(format!(
                "DSN entry must look like name=url, got '{}'",
                mask_url(s)
            ));
        };
        let name = s[..idx].trim();
        let url = s[idx + 1..].trim();

        if name.is_empty() {
            return Err("DSN name must not be empty".to_string());
        }
        Url::parse(url).map_err(|e| format!("Invalid URL for DSN '{}': {}", name, e))?;

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
        })
    }
}

impl std::fmt::Debug for DsnEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsnEntry")
            .field("name", &self.name)
            .field("url", &mask_url(&self.url))
            .finish()
    }
}

/// SQL tool server configuration.
#[derive(Clone, Parser)]
#[command(name = "sql-tool-server")]
#[command(about = "MCP server exposing SQL introspection and query tools")]
#[command(version)]
pub struct Config {
    /// Default database URL for calls that do not pass `dsn`
    #[arg(long = "db-url", value_name = "URL", env = "DB_URL", hide_env_values = true)]
    pub db_url: Option<String>,

    /// Named connection URLs callers can pass as `dsn`.
    /// Format: "name=url". Can be specified multiple times.
    #[arg(
        long = "dsn",
        value_name = "NAME=URL",
        env = "MCP_DSN",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub dsns: Vec<String>,

    /// Default database user
    #[arg(long, env = "DB_USER")]
    pub user: Option<String>,

    /// Default database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Default credential for the assistant routines
    #[arg(long = "api-key", env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Longest field value, in characters, before results are truncated
    #[arg(
        long = "max-long-data",
        default_value_t = DEFAULT_MAX_FIELD_LENGTH,
        env = "MAX_LONG_DATA"
    )]
    pub max_long_data: usize,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MCP_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "MCP_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Routine behind hybridQuery
    #[arg(long, default_value = DEFAULT_HYBRID_ROUTINE, env = "MCP_HYBRID_ROUTINE")]
    pub hybrid_routine: String,

    /// Routine behind graphQuery
    #[arg(long, default_value = DEFAULT_GRAPH_ROUTINE, env = "MCP_GRAPH_ROUTINE")]
    pub graph_routine: String,

    /// Routine behind assistantQuery
    #[arg(long, default_value = DEFAULT_ASSISTANT_ROUTINE, env = "MCP_ASSISTANT_ROUTINE")]
    pub assistant_routine: String,

    /// Routine behind generateGraphQuery
    #[arg(
        long,
        default_value = DEFAULT_GRAPH_GENERATOR_ROUTINE,
        env = "MCP_GRAPH_GENERATOR_ROUTINE"
    )]
    pub graph_generator_routine: String,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            db_url: None,
            dsns: Vec::new(),
            user: None,
            password: None,
            api_key: None,
            max_long_data: DEFAULT_MAX_FIELD_LENGTH,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            hybrid_routine: DEFAULT_HYBRID_ROUTINE.to_string(),
            graph_routine: DEFAULT_GRAPH_ROUTINE.to_string(),
            assistant_routine: DEFAULT_ASSISTANT_ROUTINE.to_string(),
            graph_generator_routine: DEFAULT_GRAPH_GENERATOR_ROUTINE.to_string(),
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Check everything that can be checked before serving.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.db_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Url::parse(url).map_err(|e| format!("Invalid --db-url: {}", e))?;
        }
        self.dsn_registry()?;
        self.routines().validate().map_err(|e| e.to_string())?;

        if self.max_long_data == 0 {
            return Err("--max-long-data must be greater than 0".to_string());
        }
        if self.query_timeout == 0 {
            return Err("--query-timeout must be greater than 0".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("--connect-timeout must be greater than 0".to_string());
        }
        if !self.mcp_endpoint.starts_with('/') {
            return Err(format!(
                "--mcp-endpoint must start with '/', got '{}'",
                self.mcp_endpoint
            ));
        }
        Ok(())
    }

    /// Named DSNs; a later entry replaces an earlier one with the same name.
    pub fn dsn_registry(&self) -> Result<HashMap<String, String>, String> {
        self.dsns
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| DsnEntry::parse(s).map(|entry| (entry.name, entry.url)))
            .collect()
    }

    pub fn routines(&self) -> RoutineCatalog {
        RoutineCatalog {
            hybrid: self.hybrid_routine.clone(),
            graph: self.graph_routine.clone(),
            assistant: self.assistant_routine.clone(),
            graph_generator: self.graph_generator_routine.clone(),
        }
    }

    pub fn connection_defaults(&self) -> Result<ConnectionDefaults, String> {
        Ok(ConnectionDefaults::new(
            self.db_url.clone(),
            self.user.clone(),
            self.password.clone(),
        )
        .with_registry(self.dsn_registry()?))
    }

    /// Everything the dispatcher consults on each call.
    pub fn dispatcher_settings(&self) -> Result<DispatcherSettings, String> {
        Ok(DispatcherSettings {
            connection: self.connection_defaults()?,
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            max_field_length: self.max_long_data,
            query_timeout: self.query_timeout_duration(),
            routines: self.routines(),
        })
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = |v: &Option<String>| v.as_ref().map(|_| "****");
        let dsn_names: Vec<&str> = self
            .dsns
            .iter()
            .filter_map(|s| s.split_once('=').map(|(name, _)| name.trim()))
            .collect();
        f.debug_struct("Config")
            .field("db_url", &self.db_url.as_deref().map(mask_url))
            .field("dsns", &dsn_names)
            .field("user", &self.user)
            .field("password", &masked(&self.password))
            .field("api_key", &masked(&self.api_key))
            .field("max_long_data", &self.max_long_data)
            .field("query_timeout", &self.query_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("routines", &self.routines())
            .field("transport", &self.transport)
            .field("http_bind_addr", &self.http_bind_addr())
            .field("mcp_endpoint", &self.mcp_endpoint)
            .field("log_level", &self.log_level)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
