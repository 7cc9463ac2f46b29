//! Tool dispatch.
//!
//! A call moves through `Received → Validated → Executing → Formatting` and
//! ends `Completed` or `Failed`. Validation never opens a connection. Once a
//! session is open it is released whether execution succeeds or not.

use crate::db::{
    ConnectionFactory, ExtensionBridge, MetadataIntrospector, QueryExecutor, QueryRequest,
    RoutineCatalog, Session,
};
use crate::error::{DbError, DbResult, ErrorDescription};
use crate::models::{
    ConnectionArgs, ConnectionDefaults, ConnectionInfo, DEFAULT_MAX_FIELD_LENGTH,
    DEFAULT_QUERY_TIMEOUT_SECS, FALLBACK_API_KEY, MAX_ROW_LIMIT, QueryParam, ResultSet,
};
use crate::tools::catalog::ToolName;
use crate::tools::format::{OutputFormat, render};
use crate::tools::inputs::{
    ConnectionOnlyInput, DescribeTableInput, ExecuteQueryInput, ExecuteQueryMarkdownInput,
    FilterTablesInput, GraphQueryInput, HybridQueryInput, ListTablesInput, PromptInput,
    QueryDatabaseInput, require_positive, require_text, row_cap,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a tool call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallState {
    Received,
    Validated,
    Executing,
    Formatting,
    Completed,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Final result of a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Payload(String),
    Error(ErrorDescription),
}

/// Record of one tool call. Secrets never appear in `arguments`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallEnvelope {
    pub tool: String,
    pub arguments: JsonValue,
    pub state: CallState,
    pub outcome: Option<ToolOutcome>,
}

impl ToolCallEnvelope {
    fn received(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            arguments: JsonValue::Object(Map::new()),
            state: CallState::Received,
            outcome: None,
        }
    }

    fn advance(&mut self, state: CallState) {
        debug!(tool = %self.tool, from = ?self.state, to = ?state, "Call state");
        self.state = state;
    }

    fn complete(mut self, payload: String) -> Self {
        self.advance(CallState::Completed);
        self.outcome = Some(ToolOutcome::Payload(payload));
        self
    }

    fn fail(mut self, error: DbError) -> Self {
        warn!(tool = %self.tool, state = ?self.state, error = %error, "Tool call failed");
        self.advance(CallState::Failed);
        self.outcome = Some(ToolOutcome::Error(error.describe()));
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == CallState::Completed
    }

    /// Payload text on success, JSON error description on failure.
    pub fn text(&self) -> String {
        match &self.outcome {
            Some(ToolOutcome::Payload(text)) => text.clone(),
            Some(ToolOutcome::Error(desc)) => serde_json::to_string(desc)
                .unwrap_or_else(|_| format!("{{\"kind\":\"{}\"}}", desc.kind)),
            None => String::new(),
        }
    }

    pub fn error(&self) -> Option<&ErrorDescription> {
        match &self.outcome {
            Some(ToolOutcome::Error(desc)) => Some(desc),
            _ => None,
        }
    }
}

/// Process-wide settings consulted on every call.
#[derive(Clone)]
pub struct DispatcherSettings {
    pub connection: ConnectionDefaults,
    pub api_key: Option<String>,
    pub max_field_length: usize,
    pub query_timeout: Duration,
    pub routines: RoutineCatalog,
}

impl std::fmt::Debug for DispatcherSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherSettings")
            .field("connection", &self.connection)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("max_field_length", &self.max_field_length)
            .field("query_timeout", &self.query_timeout)
            .field("routines", &self.routines)
            .finish()
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionDefaults::default(),
            api_key: None,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            routines: RoutineCatalog::default(),
        }
    }
}

/// A statement call after defaults are applied.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryCall {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<HashMap<String, QueryParam>>,
    max_rows: u32,
    format: OutputFormat,
    max_field_length: usize,
    #[serde(flatten)]
    connection: ConnectionArgs,
}

/// A prompt call after the api key tier is resolved.
#[derive(Serialize)]
struct PromptCall {
    prompt: String,
    #[serde(skip)]
    api_key: String,
    #[serde(flatten)]
    connection: ConnectionArgs,
}

/// A validated call, ready to run.
enum ToolCall {
    ListQualifiers(ConnectionOnlyInput),
    ListSchemas(ConnectionOnlyInput),
    ListTables(ListTablesInput),
    FilterTables(FilterTablesInput),
    DescribeTable(DescribeTableInput),
    Query(QueryCall),
    HybridQuery(HybridQueryInput),
    GraphQuery(GraphQueryInput),
    AssistantQuery(PromptCall),
    GenerateGraphQuery(PromptCall),
    ConnectionInfo(ConnectionOnlyInput),
}

impl ToolCall {
    fn connection(&self) -> &ConnectionArgs {
        match self {
            Self::ListQualifiers(i) | Self::ListSchemas(i) | Self::ConnectionInfo(i) => {
                &i.connection
            }
            Self::ListTables(i) => &i.connection,
            Self::FilterTables(i) => &i.connection,
            Self::DescribeTable(i) => &i.connection,
            Self::Query(c) => &c.connection,
            Self::HybridQuery(i) => &i.connection,
            Self::GraphQuery(i) => &i.connection,
            Self::AssistantQuery(c) | Self::GenerateGraphQuery(c) => &c.connection,
        }
    }

    /// Resolved arguments for the envelope.
    fn arguments(&self) -> JsonValue {
        let value = match self {
            Self::ListQualifiers(i) | Self::ListSchemas(i) | Self::ConnectionInfo(i) => {
                serde_json::to_value(i)
            }
            Self::ListTables(i) => serde_json::to_value(i),
            Self::FilterTables(i) => serde_json::to_value(i),
            Self::DescribeTable(i) => serde_json::to_value(i),
            Self::Query(c) => serde_json::to_value(c),
            Self::HybridQuery(i) => serde_json::to_value(i),
            Self::GraphQuery(i) => serde_json::to_value(i),
            Self::AssistantQuery(c) | Self::GenerateGraphQuery(c) => serde_json::to_value(c),
        };
        value.unwrap_or_else(|_| JsonValue::Object(Map::new()))
    }
}

/// What execution produced, before it is turned into text.
enum ToolOutput {
    Rows(ResultSet, OutputFormat),
    Json(JsonValue),
    Text(String),
}

/// Routes tool calls to the components that implement them.
#[derive(Clone)]
pub struct ToolDispatcher {
    settings: Arc<DispatcherSettings>,
    factory: Arc<dyn ConnectionFactory>,
    executor: Arc<QueryExecutor>,
    bridge: Arc<ExtensionBridge>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("query_timeout", &self.settings.query_timeout)
            .field("max_field_length", &self.settings.max_field_length)
            .field("routines", &self.settings.routines)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    pub fn new(settings: DispatcherSettings, factory: Arc<dyn ConnectionFactory>) -> Self {
        let executor = QueryExecutor::with_timeout(settings.query_timeout);
        let bridge = ExtensionBridge::new(settings.routines.clone());
        Self {
            settings: Arc::new(settings),
            factory,
            executor: Arc::new(executor),
            bridge: Arc::new(bridge),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Run one tool call to completion.
    pub async fn dispatch(
        &self,
        tool: &str,
        arguments: Option<Map<String, JsonValue>>,
    ) -> ToolCallEnvelope {
        let start = Instant::now();
        let mut envelope = ToolCallEnvelope::received(tool);

        let call = match self.validate(tool, arguments.unwrap_or_default()) {
            Ok(call) => call,
            Err(e) => return envelope.fail(e),
        };
        envelope.advance(CallState::Validated);

        let spec = self.settings.connection.resolve(call.connection());
        let mut arguments = call.arguments();
        if let JsonValue::Object(map) = &mut arguments {
            map.insert("dsn".to_string(), JsonValue::String(spec.masked_dsn()));
            map.insert("user".to_string(), JsonValue::String(spec.user.clone()));
        }
        envelope.arguments = arguments;

        envelope.advance(CallState::Executing);
        let mut guard = match self.factory.open_guarded(&spec).await {
            Ok(guard) => guard,
            Err(e) => return envelope.fail(e),
        };
        let output = self.execute(&call, guard.session()).await;
        guard.release().await;

        let output = match output {
            Ok(output) => output,
            Err(e) => return envelope.fail(e),
        };

        envelope.advance(CallState::Formatting);
        let payload = match output {
            ToolOutput::Rows(result, format) => render(&result, format),
            ToolOutput::Json(value) => value.to_string(),
            ToolOutput::Text(text) => text,
        };

        info!(
            tool = %tool,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool call completed"
        );
        envelope.complete(payload)
    }

    fn validate(&self, tool: &str, arguments: Map<String, JsonValue>) -> DbResult<ToolCall> {
        let name = ToolName::parse(tool)
            .ok_or_else(|| DbError::validation(format!("Unknown tool '{}'", tool)))?;

        let call = match name {
            ToolName::ListQualifiers => ToolCall::ListQualifiers(parse_args(name, arguments)?),
            ToolName::ListSchemas => ToolCall::ListSchemas(parse_args(name, arguments)?),
            ToolName::ConnectionInfo => ToolCall::ConnectionInfo(parse_args(name, arguments)?),
            ToolName::ListTables => {
                let input: ListTablesInput = parse_args(name, arguments)?;
                if let Some(schema) = &input.schema {
                    require_text("schema", schema)?;
                }
                ToolCall::ListTables(input)
            }
            ToolName::FilterTables => {
                let input: FilterTablesInput = parse_args(name, arguments)?;
                require_text("q", &input.q)?;
                if let Some(schema) = &input.schema {
                    require_text("schema", schema)?;
                }
                ToolCall::FilterTables(input)
            }
            ToolName::DescribeTable => {
                let input: DescribeTableInput = parse_args(name, arguments)?;
                require_text("schema", &input.schema)?;
                require_text("table", &input.table)?;
                ToolCall::DescribeTable(input)
            }
            ToolName::ExecuteQuery => {
                let input: ExecuteQueryInput = parse_args(name, arguments)?;
                ToolCall::Query(self.query_call(
                    input.query,
                    input.params,
                    row_cap("maxRows", input.max_rows)?,
                    input.format,
                    input.max_field_length,
                    input.connection,
                )?)
            }
            ToolName::ExecuteQueryMarkdown => {
                let input: ExecuteQueryMarkdownInput = parse_args(name, arguments)?;
                ToolCall::Query(self.query_call(
                    input.query,
                    input.params,
                    row_cap("maxRows", input.max_rows)?,
                    OutputFormat::Markdown,
                    input.max_field_length,
                    input.connection,
                )?)
            }
            ToolName::QueryDatabase => {
                let input: QueryDatabaseInput = parse_args(name, arguments)?;
                ToolCall::Query(self.query_call(
                    input.query,
                    input.params,
                    MAX_ROW_LIMIT,
                    input.format,
                    input.max_field_length,
                    input.connection,
                )?)
            }
            ToolName::HybridQuery => {
                let mut input: HybridQueryInput = parse_args(name, arguments)?;
                require_text("query", &input.query)?;
                input.max_rows = row_cap("maxRows", input.max_rows)?;
                require_positive("timeout", input.timeout)?;
                ToolCall::HybridQuery(input)
            }
            ToolName::GraphQuery => {
                let input: GraphQueryInput = parse_args(name, arguments)?;
                require_text("query", &input.query)?;
                require_text("format", &input.format)?;
                require_positive("timeout", input.timeout)?;
                ToolCall::GraphQuery(input)
            }
            ToolName::AssistantQuery => {
                ToolCall::AssistantQuery(self.prompt_call(name, arguments)?)
            }
            ToolName::GenerateGraphQuery => {
                ToolCall::GenerateGraphQuery(self.prompt_call(name, arguments)?)
            }
        };
        Ok(call)
    }

    fn query_call(
        &self,
        query: String,
        params: Option<HashMap<String, QueryParam>>,
        max_rows: u32,
        format: OutputFormat,
        max_field_length: Option<usize>,
        connection: ConnectionArgs,
    ) -> DbResult<QueryCall> {
        require_text("query", &query)?;
        let max_field_length = max_field_length.unwrap_or(self.settings.max_field_length);
        require_positive("maxFieldLength", max_field_length as u64)?;
        Ok(QueryCall {
            query,
            params,
            max_rows,
            format,
            max_field_length,
            connection,
        })
    }

    fn prompt_call(
        &self,
        name: ToolName,
        arguments: Map<String, JsonValue>,
    ) -> DbResult<PromptCall> {
        let input: PromptInput = parse_args(name, arguments)?;
        require_text("prompt", &input.prompt)?;
        let api_key = non_blank(input.api_key)
            .or_else(|| non_blank(self.settings.api_key.clone()))
            .unwrap_or_else(|| FALLBACK_API_KEY.to_string());
        Ok(PromptCall {
            prompt: input.prompt,
            api_key,
            connection: input.connection,
        })
    }

    async fn execute(&self, call: &ToolCall, session: &mut dyn Session) -> DbResult<ToolOutput> {
        let output = match call {
            ToolCall::ListQualifiers(_) => {
                ToolOutput::Json(to_json(&MetadataIntrospector::list_qualifiers(session).await?)?)
            }
            ToolCall::ListSchemas(_) => {
                ToolOutput::Json(to_json(&MetadataIntrospector::list_schemas(session).await?)?)
            }
            ToolCall::ListTables(input) => {
                let listing =
                    MetadataIntrospector::list_tables(session, input.schema.as_deref()).await?;
                ToolOutput::Json(to_json(&listing)?)
            }
            ToolCall::FilterTables(input) => {
                let tables = MetadataIntrospector::filter_tables(
                    session,
                    &input.q,
                    input.schema.as_deref(),
                )
                .await?;
                ToolOutput::Json(to_json(&tables)?)
            }
            ToolCall::DescribeTable(input) => {
                let definition =
                    MetadataIntrospector::describe_table(session, &input.schema, &input.table)
                        .await?;
                ToolOutput::Json(to_json(&definition)?)
            }
            ToolCall::Query(call) => {
                let request = QueryRequest {
                    sql: &call.query,
                    params: call.params.as_ref(),
                    max_rows: call.max_rows as usize,
                    max_field_length: call.max_field_length,
                };
                let result = self.executor.execute(session, &request).await?;
                ToolOutput::Rows(result, call.format)
            }
            ToolCall::HybridQuery(input) => ToolOutput::Text(
                self.bridge
                    .hybrid_query(session, &input.query, input.max_rows as usize, input.timeout)
                    .await?,
            ),
            ToolCall::GraphQuery(input) => ToolOutput::Text(
                self.bridge
                    .graph_query(session, &input.query, &input.format, input.timeout)
                    .await?,
            ),
            ToolCall::AssistantQuery(call) => ToolOutput::Text(
                self.bridge
                    .assistant_query(session, &call.prompt, &call.api_key)
                    .await?,
            ),
            ToolCall::GenerateGraphQuery(call) => ToolOutput::Text(
                self.bridge
                    .generate_graph_query(session, &call.prompt, &call.api_key)
                    .await?,
            ),
            ToolCall::ConnectionInfo(_) => {
                let server_version = match session.server_version().await {
                    Ok(version) => Some(version),
                    Err(e) if e.is_connection_level() => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "Server version unavailable");
                        None
                    }
                };
                let endpoint = session.endpoint();
                ToolOutput::Json(to_json(&ConnectionInfo {
                    backend: session.backend(),
                    server_version,
                    host: endpoint.host,
                    database: endpoint.database,
                    user: endpoint.user,
                })?)
            }
        };
        Ok(output)
    }
}

fn parse_args<T: DeserializeOwned>(
    tool: ToolName,
    arguments: Map<String, JsonValue>,
) -> DbResult<T> {
    serde_json::from_value(JsonValue::Object(arguments))
        .map_err(|e| DbError::validation(format!("Invalid arguments for {}: {}", tool, e)))
}

fn to_json<T: Serialize>(value: &T) -> DbResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| {
        DbError::query(
            format!("Failed to serialize result: {}", e),
            None,
            "Report this as a bug",
        )
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionSpec;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A factory that must never be reached.
    struct UnreachableFactory {
        opened: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionFactory for UnreachableFactory {
        async fn open(&self, _spec: &ConnectionSpec) -> DbResult<Box<dyn Session>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Err(DbError::connection("unreachable", "none"))
        }
    }

    fn dispatcher() -> (ToolDispatcher, Arc<UnreachableFactory>) {
        let factory = Arc::new(UnreachableFactory {
            opened: AtomicUsize::new(0),
        });
        let dispatcher = ToolDispatcher::new(DispatcherSettings::default(), factory.clone());
        (dispatcher, factory)
    }

    fn args(value: JsonValue) -> Option<Map<String, JsonValue>> {
        match value {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_validation_error() {
        let (dispatcher, factory) = dispatcher();
        let envelope = dispatcher.dispatch("dropEverything", None).await;
        assert_eq!(envelope.state, CallState::Failed);
        assert_eq!(
            envelope.error().unwrap().kind,
            crate::error::ErrorKind::ValidationError
        );
        assert_eq!(factory.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_open_no_connection() {
        let (dispatcher, factory) = dispatcher();
        for (tool, arguments) in [
            ("describeTable", json!({"schema": "main"})),
            ("executeQuery", json!({"query": "   "})),
            ("executeQuery", json!({"query": "SELECT 1", "maxRows": 0})),
            ("executeQuery", json!({"query": "SELECT 1", "maxFieldLength": 0})),
            ("hybridQuery", json!({"query": "q", "timeout": 0})),
            ("filterTables", json!({"q": ""})),
            ("assistantQuery", json!({"prompt": " "})),
        ] {
            let envelope = dispatcher.dispatch(tool, args(arguments)).await;
            assert_eq!(envelope.state, CallState::Failed, "{}", tool);
            assert_eq!(
                envelope.error().unwrap().kind,
                crate::error::ErrorKind::ValidationError,
                "{}",
                tool
            );
        }
        assert_eq!(factory.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_is_reported() {
        let (dispatcher, factory) = dispatcher();
        let envelope = dispatcher.dispatch("listSchemas", None).await;
        assert!(!envelope.is_success());
        assert_eq!(
            envelope.error().unwrap().kind,
            crate::error::ErrorKind::ConnectionError
        );
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
        let text = envelope.text();
        assert!(text.contains("\"kind\":\"ConnectionError\""));
    }

    #[tokio::test]
    async fn test_envelope_arguments_omit_secrets() {
        let (dispatcher, _) = dispatcher();
        let envelope = dispatcher
            .dispatch(
                "assistantQuery",
                args(json!({
                    "prompt": "hello",
                    "apiKey": "sk-secret",
                    "password": "pw-secret",
                    "dsn": "postgres://u:hunter2@db/app",
                })),
            )
            .await;
        let text = envelope.arguments.to_string();
        assert!(text.contains("hello"));
        assert!(!text.contains("sk-secret"));
        assert!(!text.contains("pw-secret"));
        assert!(!text.contains("hunter2"));
        assert_eq!(envelope.arguments["user"], "u");
    }

    #[test]
    fn test_terminal_states() {
        assert!(CallState::Completed.is_terminal());
        assert!(CallState::Failed.is_terminal());
        assert!(!CallState::Executing.is_terminal());
    }
}
