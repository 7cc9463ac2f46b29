//! Error types for the SQL tool server.
//!
//! Every failure that can reach a caller is one of six kinds. Backend errors
//! are mapped at the component boundary and keep the driver's message text so
//! the caller can diagnose the problem.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Invalid arguments: {message}")]
    Validation { message: String },

    #[error("Not found: {message} (object: {object})")]
    NotFound { message: String, object: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },
}

/// Stable, caller-facing name of an error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ConnectionError,
    ValidationError,
    NotFoundError,
    QueryError,
    TimeoutError,
    UnsupportedError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConnectionError => "ConnectionError",
            Self::ValidationError => "ValidationError",
            Self::NotFoundError => "NotFoundError",
            Self::QueryError => "QueryError",
            Self::TimeoutError => "TimeoutError",
            Self::UnsupportedError => "UnsupportedError",
        };
        f.write_str(name)
    }
}

/// Serializable error description carried by a failed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescription {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a validation error for malformed tool arguments.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::NotFound { .. } => ErrorKind::NotFoundError,
            Self::Query { .. } => ErrorKind::QueryError,
            Self::Timeout { .. } => ErrorKind::TimeoutError,
            Self::Unsupported { .. } => ErrorKind::UnsupportedError,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Errors that make every further statement on the same backend pointless.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    pub fn describe(&self) -> ErrorDescription {
        let sql_state = match self {
            Self::Query { sql_state, .. } => sql_state.clone(),
            _ => None,
        };
        ErrorDescription {
            kind: self.kind(),
            message: self.to_string(),
            sql_state,
            suggestion: self.suggestion().map(String::from),
        }
    }
}

/// PostgreSQL `query_canceled`, raised when `statement_timeout` fires.
const PG_QUERY_CANCELED: &str = "57014";
/// MySQL `ER_QUERY_TIMEOUT` (`max_execution_time`).
const MYSQL_QUERY_TIMEOUT: u16 = 3024;

fn is_statement_timeout(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    if db_err.code().as_deref() == Some(PG_QUERY_CANCELED) {
        return true;
    }
    db_err
        .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
        .is_some_and(|e| e.number() == MYSQL_QUERY_TIMEOUT)
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection URL format and credentials",
            ),
            sqlx::Error::Database(db_err) if is_statement_timeout(&*db_err) => {
                DbError::timeout(format!("statement ({})", db_err.message()), 0)
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::not_found("No rows returned", "row"),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::query(
                format!("Type not found: {}", type_name),
                None,
                "Cast the value to a type the driver understands",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::query(
                format!("Column not found: {}", col),
                None,
                "Check the column names in the statement",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::query(
                format!("Column index {} out of bounds (len: {})", index, len),
                None,
                "Check the statement's result columns",
            ),
            sqlx::Error::ColumnDecode { index, source } => DbError::query(
                format!("Failed to decode column {}: {}", index, source),
                None,
                "Cast the column to text in the statement",
            ),
            sqlx::Error::Decode(source) => DbError::query(
                format!("Decode error: {}", source),
                None,
                "Cast the value to text in the statement",
            ),
            sqlx::Error::WorkerCrashed => {
                DbError::connection("Database worker crashed", "Retry the call")
            }
            other => DbError::query(
                format!("Database error: {}", other),
                None,
                "Check the statement and the backend logs",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
