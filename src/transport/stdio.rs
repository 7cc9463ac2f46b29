//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::error::{DbError, DbResult};
use crate::mcp::DbService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};

/// Reads JSON-RPC messages from stdin and writes responses to stdout.
pub struct StdioTransport {
    service: DbService,
}

impl StdioTransport {
    pub fn new(service: DbService) -> Self {
        Self { service }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let running_service = self.service.clone().serve(stdio()).await.map_err(|e| {
            DbError::connection(
                format!("Failed to start stdio transport: {}", e),
                "Check that stdin and stdout are connected to an MCP client",
            )
        })?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Stdio transport completed normally"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        return Err(DbError::connection(
                            format!("Stdio transport error: {}", e),
                            "Restart the server",
                        ));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });

            // tokio::select! cannot interrupt a blocking stdin read
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlxConnectionFactory;
    use crate::tools::{DispatcherSettings, ToolDispatcher};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_stdio_transport_creation() {
        let factory = Arc::new(SqlxConnectionFactory::new(Duration::from_secs(1)));
        let service = DbService::new(ToolDispatcher::new(DispatcherSettings::default(), factory));
        let transport = StdioTransport::new(service);
        assert_eq!(transport.name(), "stdio");
    }
}
