//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sql_tool_server::db::{
    ConnectionFactory, FetchedRows, RoutineCall, Session, SessionEndpoint, SqlxConnectionFactory,
};
use sql_tool_server::error::DbResult;
use sql_tool_server::models::{
    ColumnDescriptor, ConnectionDefaults, ConnectionSpec, DatabaseType, ForeignKey, PrimaryKey,
    QueryParam, TableDescriptor,
};
use sql_tool_server::tools::{DispatcherSettings, ToolDispatcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const SAMPLE_SCHEMA: &str = r#"
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id),
        total REAL DEFAULT 0,
        note TEXT
    );
    CREATE TABLE order_items (
        order_id INTEGER NOT NULL REFERENCES orders(id),
        line_no INTEGER NOT NULL,
        sku TEXT NOT NULL,
        PRIMARY KEY (order_id, line_no)
    );
    CREATE VIEW recent_orders AS SELECT id, total FROM orders;
    INSERT INTO customers (name, email) VALUES ('Ada', 'ada@example.com'), ('Grace', NULL);
    INSERT INTO orders (id, customer_id, total, note) VALUES (1, 1, 12.5, 'first'), (2, 2, 99.0, NULL);
"#;

/// A SQLite file that lives as long as the fixture.
pub struct SqliteFixture {
    _file: NamedTempFile,
    pub url: String,
}

impl SqliteFixture {
    /// An empty database file.
    pub fn empty() -> Self {
        let file = NamedTempFile::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", file.path().to_str().unwrap());
        Self { _file: file, url }
    }

    /// A database with customers, orders, order_items and a view.
    pub async fn sample() -> Self {
        let fixture = Self::empty();
        fixture.run(SAMPLE_SCHEMA).await;
        fixture
    }

    pub async fn run(&self, sql: &str) {
        use sqlx::Connection;
        let mut conn = sqlx::SqliteConnection::connect(&self.url).await.unwrap();
        sqlx::raw_sql(sql).execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();
    }
}

pub fn settings_for(url: &str) -> DispatcherSettings {
    DispatcherSettings {
        connection: ConnectionDefaults::new(Some(url.to_string()), None, None),
        ..DispatcherSettings::default()
    }
}

/// A dispatcher whose default connection is `url`.
pub fn dispatcher_for(url: &str) -> ToolDispatcher {
    let factory = Arc::new(SqlxConnectionFactory::new(Duration::from_secs(5)));
    ToolDispatcher::new(settings_for(url), factory)
}

pub fn args(value: JsonValue) -> Option<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => Some(map),
        _ => panic!("arguments must be a JSON object"),
    }
}

/// Factory that records every spec it receives and counts opens and closes.
pub struct CountingFactory {
    inner: SqlxConnectionFactory,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    specs: Mutex<Vec<ConnectionSpec>>,
}

impl CountingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqlxConnectionFactory::new(Duration::from_secs(5)),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            specs: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn specs(&self) -> Vec<ConnectionSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for CountingFactory {
    async fn open(&self, spec: &ConnectionSpec) -> DbResult<Box<dyn Session>> {
        self.specs.lock().unwrap().push(spec.clone());
        let inner = self.inner.open(spec).await?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSession {
            inner,
            closed: self.closed.clone(),
        }))
    }
}

struct CountingSession {
    inner: Box<dyn Session>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for CountingSession {
    fn backend(&self) -> DatabaseType {
        self.inner.backend()
    }

    fn endpoint(&self) -> SessionEndpoint {
        self.inner.endpoint()
    }

    async fn server_version(&mut self) -> DbResult<String> {
        self.inner.server_version().await
    }

    async fn list_catalogs(&mut self) -> DbResult<Vec<String>> {
        self.inner.list_catalogs().await
    }

    async fn list_schemas(&mut self) -> DbResult<Vec<String>> {
        self.inner.list_schemas().await
    }

    async fn list_tables(&mut self, schema: &str) -> DbResult<Vec<TableDescriptor>> {
        self.inner.list_tables(schema).await
    }

    async fn find_table(
        &mut self,
        schema: &str,
        table: &str,
    ) -> DbResult<Option<TableDescriptor>> {
        self.inner.find_table(schema, table).await
    }

    async fn columns(&mut self, schema: &str, table: &str) -> DbResult<Vec<ColumnDescriptor>> {
        self.inner.columns(schema, table).await
    }

    async fn primary_key(&mut self, schema: &str, table: &str) -> DbResult<Option<PrimaryKey>> {
        self.inner.primary_key(schema, table).await
    }

    async fn foreign_keys(&mut self, schema: &str, table: &str) -> DbResult<Vec<ForeignKey>> {
        self.inner.foreign_keys(schema, table).await
    }

    async fn fetch(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        max_rows: usize,
    ) -> DbResult<FetchedRows> {
        self.inner.fetch(sql, params, max_rows).await
    }

    async fn describe_columns(&mut self, sql: &str) -> DbResult<Vec<String>> {
        self.inner.describe_columns(sql).await
    }

    async fn call_routine(&mut self, call: &RoutineCall) -> DbResult<JsonValue> {
        self.inner.call_routine(call).await
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
