//! Stored-routine calls for graph-capable backends.
//!
//! The bridge treats each routine as opaque: it binds the arguments, returns
//! the first column of the first row verbatim and only interprets the result
//! to enforce the hybrid row cap.

use crate::db::session::{RoutineCall, Session};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const DEFAULT_HYBRID_ROUTINE: &str = "Demo.demo.execute_spasql_query";
pub const DEFAULT_GRAPH_ROUTINE: &str = "\"UB\".dba.\"sparqlQuery\"";
pub const DEFAULT_ASSISTANT_ROUTINE: &str = "DEMO.DBA.OAI_VIRTUOSO_SUPPORT_AI";
pub const DEFAULT_GRAPH_GENERATOR_ROUTINE: &str = "DEMO.DBA.OAI_SPARQL_FUNC";

/// Names of the routines the bridge calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineCatalog {
    pub hybrid: String,
    pub graph: String,
    pub assistant: String,
    pub graph_generator: String,
}

impl Default for RoutineCatalog {
    fn default() -> Self {
        Self {
            hybrid: DEFAULT_HYBRID_ROUTINE.to_string(),
            graph: DEFAULT_GRAPH_ROUTINE.to_string(),
            assistant: DEFAULT_ASSISTANT_ROUTINE.to_string(),
            graph_generator: DEFAULT_GRAPH_GENERATOR_ROUTINE.to_string(),
        }
    }
}

impl RoutineCatalog {
    /// Reject names that could carry anything besides a qualified identifier.
    pub fn validate(&self) -> DbResult<()> {
        for (role, name) in [
            ("hybrid", &self.hybrid),
            ("graph", &self.graph),
            ("assistant", &self.assistant),
            ("graph generator", &self.graph_generator),
        ] {
            validate_routine_name(name).map_err(|reason| {
                DbError::validation(format!("Invalid {} routine '{}': {}", role, name, reason))
            })?;
        }
        Ok(())
    }
}

fn validate_routine_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("name is empty");
    }
    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err("empty name part");
    }
    if name.matches('"').count() % 2 != 0 {
        return Err("unbalanced double quote");
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '"' | '$'))
    {
        return Err("only identifier characters, dots and double quotes are allowed");
    }
    Ok(())
}

/// Calls the configured routines on a call's session.
#[derive(Debug, Clone, Default)]
pub struct ExtensionBridge {
    routines: RoutineCatalog,
}

impl ExtensionBridge {
    pub fn new(routines: RoutineCatalog) -> Self {
        Self { routines }
    }

    pub fn routines(&self) -> &RoutineCatalog {
        &self.routines
    }

    /// Run a SQL query with embedded graph patterns; capped to `max_rows` entries.
    pub async fn hybrid_query(
        &self,
        session: &mut dyn Session,
        query: &str,
        max_rows: usize,
        timeout_ms: u64,
    ) -> DbResult<String> {
        let call = RoutineCall::new(
            &self.routines.hybrid,
            vec![
                query.into(),
                QueryParam::Int(max_rows as i64),
                QueryParam::Int(timeout_ms as i64),
            ],
        );
        let raw = self.call_with_timeout(session, &call, timeout_ms).await?;
        Ok(cap_entries(&raw, max_rows))
    }

    /// Run a graph query; the result is returned in the requested format.
    pub async fn graph_query(
        &self,
        session: &mut dyn Session,
        query: &str,
        format: &str,
        timeout_ms: u64,
    ) -> DbResult<String> {
        let call = RoutineCall::new(
            &self.routines.graph,
            vec![
                query.into(),
                format.into(),
                QueryParam::Int(timeout_ms as i64),
            ],
        );
        self.call_with_timeout(session, &call, timeout_ms).await
    }

    pub async fn assistant_query(
        &self,
        session: &mut dyn Session,
        prompt: &str,
        api_key: &str,
    ) -> DbResult<String> {
        let call = RoutineCall::new(
            &self.routines.assistant,
            vec![prompt.into(), api_key.into()],
        );
        self.call(session, &call).await
    }

    /// Ask the backend to draft a graph query from a natural-language prompt.
    pub async fn generate_graph_query(
        &self,
        session: &mut dyn Session,
        prompt: &str,
        api_key: &str,
    ) -> DbResult<String> {
        let call = RoutineCall::new(
            &self.routines.graph_generator,
            vec![prompt.into(), api_key.into()],
        );
        self.call(session, &call).await
    }

    async fn call_with_timeout(
        &self,
        session: &mut dyn Session,
        call: &RoutineCall,
        timeout_ms: u64,
    ) -> DbResult<String> {
        match timeout(Duration::from_millis(timeout_ms), self.call(session, call)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(routine = %call.routine, timeout_ms, "Routine call timed out");
                Err(DbError::timeout(format!("routine {}", call.routine), timeout_ms))
            }
        }
    }

    async fn call(&self, session: &mut dyn Session, call: &RoutineCall) -> DbResult<String> {
        let backend = session.backend();
        debug!(routine = %call.routine, backend = %backend, "Calling routine");

        let value = session.call_routine(call).await.map_err(|e| {
            if is_missing_routine(&e, backend) {
                DbError::unsupported(format!(
                    "Routine {} is not available on this {} server",
                    call.routine, backend
                ))
            } else {
                e
            }
        })?;

        Ok(match value {
            JsonValue::String(s) => s,
            other => other.to_string(),
        })
    }
}

/// Whether a driver error says the routine (or its schema) does not exist.
fn is_missing_routine(err: &DbError, backend: DatabaseType) -> bool {
    let DbError::Query {
        message, sql_state, ..
    } = err
    else {
        return false;
    };
    let message = message.to_lowercase();
    match backend {
        // undefined_function, invalid_schema_name, cross-database reference
        DatabaseType::PostgreSQL => {
            matches!(sql_state.as_deref(), Some("42883" | "3F000" | "0A000"))
        }
        // ER_SP_DOES_NOT_EXIST (1305) only carries the generic 42000 state
        DatabaseType::MySQL => message.contains("function") && message.contains("does not exist"),
        DatabaseType::SQLite => message.contains("no such function"),
    }
}

/// Keep at most `max_rows` entries of a JSON array or line-delimited result.
fn cap_entries(raw: &str, max_rows: usize) -> String {
    if let Ok(JsonValue::Array(mut items)) = serde_json::from_str::<JsonValue>(raw) {
        if items.len() <= max_rows {
            return raw.to_string();
        }
        items.truncate(max_rows);
        return JsonValue::Array(items).to_string();
    }

    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    let line_delimited = lines.len() > 1
        && lines
            .iter()
            .all(|l| serde_json::from_str::<JsonValue>(l).is_ok());
    if line_delimited && lines.len() > max_rows {
        return lines[..max_rows].join("\n");
    }
    raw.to_string()
}
