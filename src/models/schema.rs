//! Schema-related data models.
//!
//! Backend metadata is normalized into these shapes by the metadata
//! introspector. Optional parts of a table definition are always present in
//! serialized output (`null` or an empty list) so callers can rely on the shape.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    TemporaryTable,
}

impl TableType {
    /// Parse a backend-reported table type string.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "view" | "system view" => Self::View,
            "materialized view" | "matview" => Self::MaterializedView,
            "local temporary" | "temporary" | "temp" => Self::TemporaryTable,
            _ => Self::Table,
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "TABLE"),
            Self::View => write!(f, "VIEW"),
            Self::MaterializedView => write!(f, "MATERIALIZED VIEW"),
            Self::TemporaryTable => write!(f, "TEMPORARY TABLE"),
        }
    }
}

/// One physical table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    pub schema: String,
    #[serde(rename = "table")]
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: TableType,
}

impl TableDescriptor {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            catalog: None,
            schema: schema.into(),
            name: name.into(),
            table_type,
        }
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as reported by the backend
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    /// 1-based position in backend-reported order
    pub ordinal_position: u32,
    pub default: Option<String>,
    pub autoincrement: bool,
    pub primary_key: bool,
}

impl ColumnDescriptor {
    /// Create a column; the ordinal position is assigned during normalization.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            ordinal_position: 0,
            default: None,
            autoincrement: false,
            primary_key: false,
        }
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }

    pub fn with_autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub constrained_columns: Vec<String>,
    pub referred_schema: Option<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(name: Option<String>, referred_table: impl Into<String>) -> Self {
        Self {
            name,
            constrained_columns: Vec::new(),
            referred_schema: None,
            referred_table: referred_table.into(),
            referred_columns: Vec::new(),
        }
    }

    pub fn with_referred_schema(mut self, schema: Option<String>) -> Self {
        self.referred_schema = schema;
        self
    }

    /// Append one column pair of a (possibly composite) key.
    pub fn push_pair(&mut self, column: impl Into<String>, referred: impl Into<String>) {
        self.constrained_columns.push(column.into());
        self.referred_columns.push(referred.into());
    }
}

/// Full description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    #[serde(flatten)]
    pub table: TableDescriptor,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// A schema whose tables could not be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSchema {
    pub schema: String,
    pub error: String,
}

/// Result of listing tables across one or more schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableListing {
    pub tables: Vec<TableDescriptor>,
    pub skipped: Vec<SkippedSchema>,
}
