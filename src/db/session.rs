//! Per-call database sessions.
//!
//! A `ConnectionFactory` opens one `Session` per tool call. The session is
//! wrapped in a `SessionGuard` that closes it on every exit path.

use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDescriptor, ConnectionSpec, DatabaseType, ForeignKey, PrimaryKey, QueryParam,
    TableDescriptor,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Rows pulled from one statement, already decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRows {
    /// Empty when no row was returned
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

/// Where a session is connected, without secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoint {
    pub host: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
}

/// A stored-routine invocation with positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineCall {
    pub routine: String,
    pub args: Vec<QueryParam>,
}

impl RoutineCall {
    pub fn new(routine: impl Into<String>, args: Vec<QueryParam>) -> Self {
        Self {
            routine: routine.into(),
            args,
        }
    }

    /// `SELECT routine(?, ?, ...)` with the backend's placeholder style.
    pub fn to_sql(&self, backend: DatabaseType) -> String {
        let placeholders: Vec<String> = (1..=self.args.len())
            .map(|n| match backend {
                DatabaseType::PostgreSQL => format!("${}", n),
                _ => "?".to_string(),
            })
            .collect();
        format!("SELECT {}({})", self.routine, placeholders.join(", "))
    }
}

/// One open connection, scoped to a single tool call.
#[async_trait]
pub trait Session: Send {
    fn backend(&self) -> DatabaseType;

    fn endpoint(&self) -> SessionEndpoint;

    async fn server_version(&mut self) -> DbResult<String>;

    /// Catalog (database) names, where the backend distinguishes them.
    async fn list_catalogs(&mut self) -> DbResult<Vec<String>>;

    /// Schema names in backend order.
    async fn list_schemas(&mut self) -> DbResult<Vec<String>>;

    async fn list_tables(&mut self, schema: &str) -> DbResult<Vec<TableDescriptor>>;

    async fn find_table(
        &mut self,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<TableDescriptor>> {
        let tables = self.list_tables(schema).await?;
        Ok(tables.into_iter().find(|t| t.name == table))
    }

    /// Columns in backend-reported order; ordinal positions may be unset.
    async fn columns(&mut self, schema: &str, table: &str) -> DbResult<Vec<ColumnDescriptor>>;

    async fn primary_key(&mut self, schema: &str, table: &str) -> DbResult<Option<PrimaryKey>>;

    async fn foreign_keys(&mut self, schema: &str, table: &str) -> DbResult<Vec<ForeignKey>>;

    /// Run a positional statement and pull at most `max_rows` rows.
    async fn fetch(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        max_rows: usize,
    ) -> DbResult<FetchedRows>;

    /// Result column names from the driver's statement description.
    async fn describe_columns(&mut self, sql: &str) -> DbResult<Vec<String>>;

    /// First column of the first row returned by a stored routine.
    async fn call_routine(&mut self, call: &RoutineCall) -> DbResult<JsonValue> {
        Err(DbError::unsupported(format!(
            "{} sessions cannot call stored routine {}",
            self.backend(),
            call.routine
        )))
    }

    async fn close(self: Box<Self>) -> DbResult<()>;
}

/// Opens sessions from a resolved connection spec.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, spec: &ConnectionSpec) -> DbResult<Box<dyn Session>>;

    /// Open a session wrapped in a guard that closes it on drop.
    async fn open_guarded(&self, spec: &ConnectionSpec) -> DbResult<SessionGuard> {
        let session = self.open(spec).await?;
        Ok(SessionGuard::new(session))
    }
}

/// RAII guard for a per-call session.
///
/// Call `release().await` when done. If the guard is dropped instead (early
/// return, panic, cancelled future), the close is spawned on the runtime.
pub struct SessionGuard {
    session: Option<Box<dyn Session>>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("backend", &self.session.as_ref().map(|s| s.backend()))
            .field("released", &self.session.is_none())
            .finish()
    }
}

impl SessionGuard {
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&mut self) -> &mut dyn Session {
        match self.session.as_deref_mut() {
            Some(session) => session,
            // `release` consumes the guard, so the session is always present here
            None => unreachable!("session accessed after release"),
        }
    }

    /// Explicitly close the session (preferred over relying on Drop).
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            let backend = session.backend();
            if let Err(e) = session.close().await {
                warn!(backend = %backend, error = %e, "Failed to close session");
            } else {
                debug!(backend = %backend, "Session closed");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let backend = session.backend();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(backend = %backend, error = %e, "Failed to close session");
                    }
                    warn!(
                        backend = %backend,
                        "Session released via Drop - consider using explicit release()"
                    );
                });
            }
            Err(_) => {
                // No runtime left; dropping the connection closes the socket
                warn!(backend = %backend, "Session dropped outside the runtime");
            }
        }
    }
}
