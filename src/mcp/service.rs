//! MCP service implementation using rmcp.
//!
//! `DbService` publishes the tool catalog and hands every call to the
//! `ToolDispatcher`, which owns validation, connections and the error
//! contract. Failed calls come back as tool errors carrying the JSON error
//! description, never as protocol errors.

use crate::tools::ToolDispatcher;
use crate::tools::catalog::ToolName;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct DbService {
    dispatcher: ToolDispatcher,
    /// Built once; schemas do not change at runtime
    tools: Arc<Vec<Tool>>,
}

impl DbService {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self {
            dispatcher,
            tools: Arc::new(tool_list()),
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Run a call and convert its envelope to an MCP result.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> CallToolResult {
        let envelope = self.dispatcher.dispatch(name, arguments).await;
        let text = envelope.text();
        if envelope.is_success() {
            CallToolResult::success(vec![Content::text(text)])
        } else {
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

fn tool_list() -> Vec<Tool> {
    ToolName::ALL
        .iter()
        .map(|tool| {
            Tool::new(
                tool.as_str(),
                tool.description(),
                Arc::new(tool.input_schema()),
            )
        })
        .collect()
}

impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sql-tool-server".to_owned(),
                title: Some("SQL Tool Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Database tools for exploring and querying SQL databases.\n\
                \n\
                ## Connections\n\
                Every call opens its own connection and closes it before returning.\n\
                Pass `dsn` (a connection URL or a registered DSN name), `user` and `password`\n\
                to override the server defaults for a single call.\n\
                \n\
                ## Workflow\n\
                1. `listSchemas` or `listTables` to find tables (`filterTables` to search by name)\n\
                2. `describeTable` for columns and keys\n\
                3. `executeQuery` with :name placeholders and `params` for values\n\
                \n\
                ## Limits\n\
                Results are capped by `maxRows`; long fields end with `…[truncated, N chars]`.\n\
                \n\
                ## Errors\n\
                Failed calls return `{kind, message}` where kind is one of ConnectionError,\n\
                ValidationError, NotFoundError, QueryError, TimeoutError or UnsupportedError."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools.to_vec()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = %request.name, "Tool call received");
        Ok(self.invoke(&request.name, request.arguments).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlxConnectionFactory;
    use crate::tools::DispatcherSettings;
    use std::time::Duration;

    fn create_test_service() -> DbService {
        let factory = Arc::new(SqlxConnectionFactory::new(Duration::from_secs(1)));
        DbService::new(ToolDispatcher::new(DispatcherSettings::default(), factory))
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "sql-tool-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_every_tool_is_published() {
        let service = create_test_service();
        let names: Vec<_> = service.tools().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(names.len(), ToolName::ALL.len());
        assert!(names.contains(&"executeQuery".to_string()));
        assert!(names.contains(&"connectionInfo".to_string()));
    }

    #[tokio::test]
    async fn test_failed_call_is_tool_error() {
        let service = create_test_service();
        let result = service.invoke("noSuchTool", None).await;
        assert_eq!(result.is_error, Some(true));
    }
}
