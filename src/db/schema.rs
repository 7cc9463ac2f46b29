//! Schema introspection over a per-call session.
//!
//! Backend catalog queries live in `catalog`; this module normalizes what
//! they return into the shapes tools hand back: contiguous ordinal positions,
//! primary-key flags on columns and per-schema skip reporting.

use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::{SkippedSchema, TableDefinition, TableDescriptor, TableListing};
use tracing::{debug, warn};

/// Metadata operations shared by the introspection tools.
pub struct MetadataIntrospector;

impl MetadataIntrospector {
    /// Catalog names; empty where the backend has no catalog level.
    pub async fn list_qualifiers(session: &mut dyn Session) -> DbResult<Vec<String>> {
        session.list_catalogs().await
    }

    /// Schema names in the order the backend reports them.
    pub async fn list_schemas(session: &mut dyn Session) -> DbResult<Vec<String>> {
        session.list_schemas().await
    }

    /// List tables and views in one schema, or in every schema.
    ///
    /// A named schema that does not exist is `NotFound`. When walking every
    /// schema, connection-level failures abort; anything else is logged and
    /// reported in `skipped`.
    pub async fn list_tables(
        session: &mut dyn Session,
        schema: Option<&str>,
    ) -> DbResult<TableListing> {
        if let Some(schema) = schema {
            let schemas = session.list_schemas().await?;
            if !schemas.iter().any(|s| s == schema) {
                return Err(DbError::not_found(
                    format!("Schema '{}' does not exist", schema),
                    schema,
                ));
            }
            let tables = session.list_tables(schema).await?;
            debug!(schema = %schema, count = tables.len(), "Listed tables");
            return Ok(TableListing {
                tables,
                skipped: Vec::new(),
            });
        }

        let mut listing = TableListing::default();
        for schema in session.list_schemas().await? {
            match session.list_tables(&schema).await {
                Ok(tables) => listing.tables.extend(tables),
                Err(e) if e.is_connection_level() => return Err(e),
                Err(e) => {
                    warn!(schema = %schema, error = %e, "Skipping schema");
                    listing.skipped.push(SkippedSchema {
                        schema,
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(
            count = listing.tables.len(),
            skipped = listing.skipped.len(),
            "Listed tables across schemas"
        );
        Ok(listing)
    }

    /// Tables whose name contains `q`.
    ///
    /// Matching follows the backend's `LIKE` default: case-sensitive on
    /// PostgreSQL, case-insensitive elsewhere.
    pub async fn filter_tables(
        session: &mut dyn Session,
        q: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<TableDescriptor>> {
        let case_sensitive = session.backend().case_sensitive_matching();
        let listing = Self::list_tables(session, schema).await?;

        let needle = if case_sensitive {
            q.to_string()
        } else {
            q.to_lowercase()
        };
        Ok(listing
            .tables
            .into_iter()
            .filter(|t| {
                if case_sensitive {
                    t.name.contains(&needle)
                } else {
                    t.name.to_lowercase().contains(&needle)
                }
            })
            .collect())
    }

    /// Describe one table: columns, primary key and foreign keys.
    pub async fn describe_table(
        session: &mut dyn Session,
        schema: &str,
        table: &str,
    ) -> DbResult<TableDefinition> {
        let descriptor = session.find_table(schema, table).await?.ok_or_else(|| {
            DbError::not_found(
                format!("Table '{}' does not exist in schema '{}'", table, schema),
                format!("{}.{}", schema, table),
            )
        })?;

        let mut columns = session.columns(schema, table).await?;
        let primary_key = session.primary_key(schema, table).await?;
        let foreign_keys = session.foreign_keys(schema, table).await?;

        for (idx, column) in columns.iter_mut().enumerate() {
            column.ordinal_position = idx as u32 + 1;
            if let Some(pk) = &primary_key {
                column.primary_key = pk.columns.iter().any(|c| *c == column.name);
            }
        }

        debug!(
            schema = %schema,
            table = %table,
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "Described table"
        );

        Ok(TableDefinition {
            table: descriptor,
            columns,
            primary_key,
            foreign_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::SqlxConnectionFactory;
    use crate::db::session::{ConnectionFactory, SessionGuard};
    use crate::models::{ConnectionSpec, TableType};
    use std::time::Duration;

    async fn memory_session() -> SessionGuard {
        let factory = SqlxConnectionFactory::new(Duration::from_secs(5));
        let mut guard = factory
            .open_guarded(&ConnectionSpec::new("sqlite::memory:", "demo", "demo"))
            .await
            .unwrap();
        let session = guard.session();
        for sql in [
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, note TEXT DEFAULT 'n/a')",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), total REAL)",
            "CREATE TABLE order_items (order_id INTEGER, line INTEGER, sku TEXT, PRIMARY KEY (order_id, line), FOREIGN KEY (order_id) REFERENCES orders(id))",
            "CREATE VIEW recent_orders AS SELECT * FROM orders",
        ] {
            session.fetch(sql, &[], 1).await.unwrap();
        }
        guard
    }

    #[tokio::test]
    async fn test_list_schemas_is_stable() {
        let mut guard = memory_session().await;
        let first = MetadataIntrospector::list_schemas(guard.session()).await.unwrap();
        let second = MetadataIntrospector::list_schemas(guard.session()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["main".to_string()]);
        guard.release().await;
    }

    #[tokio::test]
    async fn test_list_tables_all_schemas() {
        let mut guard = memory_session().await;
        let listing = MetadataIntrospector::list_tables(guard.session(), None)
            .await
            .unwrap();
        let names: Vec<_> = listing.tables.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"customers"));
        assert!(names.contains(&"recent_orders"));
        assert!(listing.skipped.is_empty());
        let view = listing
            .tables
            .iter()
            .find(|t| t.name == "recent_orders")
            .unwrap();
        assert_eq!(view.table_type, TableType::View);
        guard.release().await;
    }

    #[tokio::test]
    async fn test_list_tables_unknown_schema_is_not_found() {
        let mut guard = memory_session().await;
        let err = MetadataIntrospector::list_tables(guard.session(), Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        guard.release().await;
    }

    #[tokio::test]
    async fn test_filter_tables_is_case_insensitive_on_sqlite() {
        let mut guard = memory_session().await;
        let tables = MetadataIntrospector::filter_tables(guard.session(), "ORD", None)
            .await
            .unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["order_items", "orders", "recent_orders"]);
        guard.release().await;
    }

    #[tokio::test]
    async fn test_describe_table_numbers_columns_and_keys() {
        let mut guard = memory_session().await;
        let def = MetadataIntrospector::describe_table(guard.session(), "main", "order_items")
            .await
            .unwrap();
        let ordinals: Vec<_> = def.columns.iter().map(|c| c.ordinal_position).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);

        let pk = def.primary_key.unwrap();
        assert_eq!(pk.columns, vec!["order_id", "line"]);
        assert!(def.columns[0].primary_key);
        assert!(def.columns[1].primary_key);
        assert!(!def.columns[2].primary_key);

        assert_eq!(def.foreign_keys.len(), 1);
        assert_eq!(def.foreign_keys[0].referred_table, "orders");
        assert_eq!(def.foreign_keys[0].constrained_columns, vec!["order_id"]);
        guard.release().await;
    }

    #[tokio::test]
    async fn test_describe_missing_table_is_not_found() {
        let mut guard = memory_session().await;
        let err = MetadataIntrospector::describe_table(guard.session(), "main", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        guard.release().await;
    }
}
