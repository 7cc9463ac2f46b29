//! Database dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate database-specific
//! implementations while maintaining linear readability. The macros expand
//! at compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `SqlxConnection` variants, reducing the
/// need to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(&mut self.conn, {
///     MySql(c) => catalog::mysql::list_schemas(c).await,
///     Postgres(c) => catalog::postgres::list_schemas(c).await,
///     SQLite(c) => catalog::sqlite::list_schemas(c).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::SqlxConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
