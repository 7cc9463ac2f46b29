//! Backend catalog queries.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, sqlite), each providing the same interface over
//! a single connection. Results are returned in backend order; normalization
//! happens in the metadata introspector.

use crate::error::DbResult;
use crate::models::{ColumnDescriptor, ForeignKey, PrimaryKey, TableDescriptor, TableType};
use tracing::debug;

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const SERVER_VERSION: &str = "SELECT version()";

        pub const LIST_CATALOGS: &str = r#"
            SELECT datname::text AS name
            FROM pg_database
            WHERE datistemplate = false
            ORDER BY datname
            "#;

        pub const LIST_SCHEMAS: &str = r#"
            SELECT nspname::text AS name
            FROM pg_namespace
            WHERE nspname NOT LIKE 'pg\_%'
            ORDER BY nspname
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                table_catalog::text AS table_catalog,
                table_name::text AS table_name,
                table_type::text AS table_type
            FROM information_schema.tables
            WHERE table_schema = $1
            AND table_type IN ('BASE TABLE', 'VIEW', 'LOCAL TEMPORARY')
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                a.attname::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS column_type,
                NOT a.attnotnull AS nullable,
                pg_get_expr(d.adbin, d.adrelid) AS column_default,
                a.attidentity::text AS identity
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1
            AND c.relname = $2
            AND a.attnum > 0
            AND NOT a.attisdropped
            ORDER BY a.attnum
            "#;

        pub const DESCRIBE_PRIMARY_KEY: &str = r#"
            SELECT
                con.conname::text AS constraint_name,
                a.attname::text AS column_name
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            WHERE con.contype = 'p'
            AND n.nspname = $1
            AND c.relname = $2
            ORDER BY k.ord
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT
                con.conname::text AS constraint_name,
                a.attname::text AS column_name,
                rn.nspname::text AS referred_schema,
                rc.relname::text AS referred_table,
                ra.attname::text AS referred_column
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_class rc ON rc.oid = con.confrelid
            JOIN pg_namespace rn ON rn.oid = rc.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                WITH ORDINALITY AS k(attnum, refnum, ord)
            JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum
            WHERE con.contype = 'f'
            AND n.nspname = $1
            AND c.relname = $2
            ORDER BY con.conname, k.ord
            "#;
    }

    pub mod mysql {
        pub const SERVER_VERSION: &str = "SELECT version()";

        pub const LIST_SCHEMAS: &str = r#"
            SELECT CONVERT(SCHEMA_NAME USING utf8) AS SCHEMA_NAME
            FROM information_schema.SCHEMATA
            ORDER BY SCHEMA_NAME
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(TABLE_TYPE USING utf8) AS TABLE_TYPE
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
                CONVERT(EXTRA USING utf8) AS EXTRA
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#;

        pub const DESCRIBE_PRIMARY_KEY: &str = r#"
            SELECT CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(REFERENCED_TABLE_SCHEMA USING utf8) AS REFERENCED_TABLE_SCHEMA,
                CONVERT(REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
                CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const SERVER_VERSION: &str = "SELECT sqlite_version()";

        pub const LIST_SCHEMAS: &str = r#"
            SELECT name FROM pragma_database_list
            WHERE name <> 'temp'
            ORDER BY seq
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?1, ?2)
            ORDER BY cid
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT id, seq, "table", "from", "to"
            FROM pragma_foreign_key_list(?1, ?2)
            ORDER BY id, seq
            "#;

        /// sqlite_master can only be schema-qualified with an identifier.
        pub fn list_tables(schema: &str) -> String {
            format!(
                "SELECT name, type FROM {}.sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                 ORDER BY name",
                super::super::quote_ident(schema)
            )
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Group per-column foreign key rows into one key per constraint.
///
/// Rows must arrive ordered by constraint, then by position within it.
fn group_foreign_keys<I>(rows: I) -> Vec<ForeignKey>
where
    I: IntoIterator<Item = ForeignKeyRow>,
{
    let mut keys: Vec<(String, ForeignKey)> = Vec::new();
    for row in rows {
        match keys.last_mut() {
            Some((id, key)) if *id == row.constraint_id => {
                key.push_pair(row.column, row.referred_column);
            }
            _ => {
                let mut key = ForeignKey::new(row.name, row.referred_table)
                    .with_referred_schema(row.referred_schema);
                key.push_pair(row.column, row.referred_column);
                keys.push((row.constraint_id, key));
            }
        }
    }
    keys.into_iter().map(|(_, key)| key).collect()
}

struct ForeignKeyRow {
    constraint_id: String,
    name: Option<String>,
    column: String,
    referred_schema: Option<String>,
    referred_table: String,
    referred_column: String,
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

pub mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    pub async fn server_version(conn: &mut PgConnection) -> DbResult<String> {
        let version = sqlx::query_scalar::<_, String>(queries::postgres::SERVER_VERSION)
            .fetch_one(conn)
            .await?;
        Ok(version)
    }

    pub async fn list_catalogs(conn: &mut PgConnection) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(queries::postgres::LIST_CATALOGS)
            .fetch_all(conn)
            .await?;
        Ok(names)
    }

    pub async fn list_schemas(conn: &mut PgConnection) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(queries::postgres::LIST_SCHEMAS)
            .fetch_all(conn)
            .await?;
        Ok(names)
    }

    pub async fn list_tables(
        conn: &mut PgConnection,
        schema: &str,
    ) -> DbResult<Vec<TableDescriptor>> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema)
            .fetch_all(conn)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let catalog: String = row.try_get("table_catalog")?;
            let name: String = row.try_get("table_name")?;
            let type_str: String = row.try_get("table_type")?;
            tables.push(
                TableDescriptor::new(schema, name, TableType::parse(&type_str))
                    .with_catalog(catalog),
            );
        }

        debug!(count = tables.len(), schema = schema, "Listed PostgreSQL tables");
        Ok(tables)
    }

    pub async fn columns(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(schema)
            .bind(table)
            .fetch_all(conn)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("column_name")?;
            let column_type: String = row.try_get("column_type")?;
            let nullable: bool = row.try_get("nullable")?;
            let default: Option<String> = row.try_get("column_default")?;
            let identity: Option<String> = row.try_get("identity")?;

            let autoincrement = identity.as_deref().is_some_and(|i| !i.is_empty())
                || default
                    .as_deref()
                    .is_some_and(|d| d.starts_with("nextval("));
            columns.push(
                ColumnDescriptor::new(name, column_type, nullable)
                    .with_default(default)
                    .with_autoincrement(autoincrement),
            );
        }
        Ok(columns)
    }

    pub async fn primary_key(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<PrimaryKey>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_PRIMARY_KEY)
            .bind(schema)
            .bind(table)
            .fetch_all(conn)
            .await?;

        let mut name = None;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            name = Some(row.try_get::<String, _>("constraint_name")?);
            columns.push(row.try_get::<String, _>("column_name")?);
        }
        Ok((!columns.is_empty()).then_some(PrimaryKey { name, columns }))
    }

    pub async fn foreign_keys(
        conn: &mut PgConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_FOREIGN_KEYS)
            .bind(schema)
            .bind(table)
            .fetch_all(conn)
            .await?;

        let mut fk_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("constraint_name")?;
            fk_rows.push(ForeignKeyRow {
                constraint_id: name.clone(),
                name: Some(name),
                column: row.try_get("column_name")?,
                referred_schema: Some(row.try_get("referred_schema")?),
                referred_table: row.try_get("referred_table")?,
                referred_column: row.try_get("referred_column")?,
            });
        }
        Ok(group_foreign_keys(fk_rows))
    }
}

pub mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlConnection, Row};

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn server_version(conn: &mut MySqlConnection) -> DbResult<String> {
        let row = sqlx::query(queries::mysql::SERVER_VERSION)
            .fetch_one(conn)
            .await?;
        let version = match row.try_get::<String, _>(0) {
            Ok(version) => version,
            Err(_) => String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(0)?).into_owned(),
        };
        Ok(version)
    }

    pub async fn list_schemas(conn: &mut MySqlConnection) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_SCHEMAS)
            .fetch_all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| get_string(row, "SCHEMA_NAME"))
            .filter(|name| !name.is_empty())
            .collect())
    }

    pub async fn list_tables(
        conn: &mut MySqlConnection,
        schema: &str,
    ) -> DbResult<Vec<TableDescriptor>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .fetch_all(conn)
            .await?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, "TABLE_NAME");
                if name.is_empty() {
                    return None;
                }
                let type_str = get_string(row, "TABLE_TYPE");
                Some(TableDescriptor::new(schema, name, TableType::parse(&type_str)))
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), schema = schema, "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn columns(
        conn: &mut MySqlConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(schema)
            .bind(table)
            .fetch_all(conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let extra = get_string(row, "EXTRA").to_lowercase();
                ColumnDescriptor::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    get_string(row, "IS_NULLABLE") == "YES",
                )
                .with_default(get_optional_string(row, "COLUMN_DEFAULT"))
                .with_autoincrement(extra.contains("auto_increment"))
            })
            .collect())
    }

    pub async fn primary_key(
        conn: &mut MySqlConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<PrimaryKey>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_PRIMARY_KEY)
            .bind(schema)
            .bind(table)
            .fetch_all(conn)
            .await?;

        let columns: Vec<String> = rows
            .iter()
            .map(|row| get_string(row, "COLUMN_NAME"))
            .collect();
        Ok((!columns.is_empty()).then(|| PrimaryKey {
            name: Some("PRIMARY".to_string()),
            columns,
        }))
    }

    pub async fn foreign_keys(
        conn: &mut MySqlConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_FOREIGN_KEYS)
            .bind(schema)
            .bind(table)
            .fetch_all(conn)
            .await?;

        Ok(group_foreign_keys(rows.iter().map(|row| {
            let name = get_string(row, "CONSTRAINT_NAME");
            ForeignKeyRow {
                constraint_id: name.clone(),
                name: Some(name),
                column: get_string(row, "COLUMN_NAME"),
                referred_schema: get_optional_string(row, "REFERENCED_TABLE_SCHEMA"),
                referred_table: get_string(row, "REFERENCED_TABLE_NAME"),
                referred_column: get_string(row, "REFERENCED_COLUMN_NAME"),
            }
        })))
    }
}

pub mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn server_version(conn: &mut SqliteConnection) -> DbResult<String> {
        let version = sqlx::query_scalar::<_, String>(queries::sqlite::SERVER_VERSION)
            .fetch_one(conn)
            .await?;
        Ok(version)
    }

    pub async fn list_schemas(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(queries::sqlite::LIST_SCHEMAS)
            .fetch_all(conn)
            .await?;
        Ok(names)
    }

    pub async fn list_tables(
        conn: &mut SqliteConnection,
        schema: &str,
    ) -> DbResult<Vec<TableDescriptor>> {
        let sql = queries::sqlite::list_tables(schema);
        let rows = sqlx::query(&sql).fetch_all(conn).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name")?;
            let type_str: String = row.try_get("type")?;
            tables.push(TableDescriptor::new(schema, name, TableType::parse(&type_str)));
        }

        debug!(count = tables.len(), schema = schema, "Listed SQLite tables");
        Ok(tables)
    }

    struct PragmaColumn {
        name: String,
        data_type: String,
        not_null: bool,
        default: Option<String>,
        pk_position: i64,
    }

    async fn pragma_columns(
        conn: &mut SqliteConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<PragmaColumn>> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_COLUMNS)
            .bind(table)
            .bind(schema)
            .fetch_all(conn)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(PragmaColumn {
                name: row.try_get("name")?,
                data_type: row.try_get("type")?,
                not_null: row.try_get::<i64, _>("notnull")? != 0,
                default: row.try_get("dflt_value")?,
                pk_position: row.try_get("pk")?,
            });
        }
        Ok(columns)
    }

    pub async fn columns(
        conn: &mut SqliteConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let columns = pragma_columns(conn, schema, table).await?;
        let pk_count = columns.iter().filter(|c| c.pk_position > 0).count();

        Ok(columns
            .into_iter()
            .map(|c| {
                // A lone INTEGER PRIMARY KEY aliases the rowid
                let rowid_alias = pk_count == 1
                    && c.pk_position > 0
                    && c.data_type.eq_ignore_ascii_case("INTEGER");
                ColumnDescriptor::new(c.name, c.data_type, !c.not_null)
                    .with_default(c.default)
                    .with_autoincrement(rowid_alias)
            })
            .collect())
    }

    pub async fn primary_key(
        conn: &mut SqliteConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<PrimaryKey>> {
        let mut columns: Vec<PragmaColumn> = pragma_columns(conn, schema, table)
            .await?
            .into_iter()
            .filter(|c| c.pk_position > 0)
            .collect();
        columns.sort_by_key(|c| c.pk_position);

        let columns: Vec<String> = columns.into_iter().map(|c| c.name).collect();
        Ok((!columns.is_empty()).then_some(PrimaryKey {
            name: None,
            columns,
        }))
    }

    pub async fn foreign_keys(
        conn: &mut SqliteConnection,
        schema: &str,
        table: &str,
    ) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_FOREIGN_KEYS)
            .bind(table)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await?;

        let mut fk_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let referred_table: String = row.try_get("table")?;
            let referred: Option<String> = row.try_get("to")?;
            let referred_column = match referred {
                Some(column) => column,
                // Omitted target columns reference the parent's primary key
                None => {
                    let seq: i64 = row.try_get("seq")?;
                    primary_key(&mut *conn, schema, &referred_table)
                        .await?
                        .and_then(|pk| pk.columns.into_iter().nth(seq as usize))
                        .unwrap_or_default()
                }
            };
            fk_rows.push(ForeignKeyRow {
                constraint_id: id.to_string(),
                name: None,
                column: row.try_get("from")?,
                referred_schema: None,
                referred_table,
                referred_column,
            });
        }
        Ok(group_foreign_keys(fk_rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_row(id: &str, column: &str, referred_column: &str) -> ForeignKeyRow {
        ForeignKeyRow {
            constraint_id: id.to_string(),
            name: Some(id.to_string()),
            column: column.to_string(),
            referred_schema: Some("public".to_string()),
            referred_table: "orders".to_string(),
            referred_column: referred_column.to_string(),
        }
    }

    #[test]
    fn test_group_foreign_keys_by_constraint() {
        let keys = group_foreign_keys(vec![
            fk_row("fk_a", "order_id", "id"),
            fk_row("fk_a", "order_rev", "rev"),
            fk_row("fk_b", "parent_id", "id"),
        ]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].name.as_deref(), Some("fk_a"));
        assert_eq!(keys[0].constrained_columns, vec!["order_id", "order_rev"]);
        assert_eq!(keys[0].referred_columns, vec!["id", "rev"]);
        assert_eq!(keys[1].constrained_columns, vec!["parent_id"]);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("main"), "\"main\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_sqlite_list_tables_quotes_schema() {
        let sql = queries::sqlite::list_tables("aux db");
        assert!(sql.contains("FROM \"aux db\".sqlite_master"));
    }
}
