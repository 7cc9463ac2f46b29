//! Database-agnostic type mappings.
//!
//! This module converts backend rows into JSON values.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! A SQL NULL always becomes JSON `null`. A non-null value that cannot be
//! decoded becomes the string `<unsupported type: NAME>` so it is never
//! mistaken for a NULL.

use crate::models::DatabaseType;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Character types first so "tinytext" is not read as an integer
    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        "timestamptz" | "timestamp with time zone" => return TypeCategory::TimestampTz,
        // MySQL TIMESTAMP values are stored in UTC
        "timestamp" if db == DatabaseType::MySQL => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" | "timestamp without time zone" => {
            return TypeCategory::Timestamp;
        }
        "interval" | "point" => return TypeCategory::Unknown,
        "bool" | "boolean" => return TypeCategory::Boolean,
        "json" | "jsonb" => return TypeCategory::Json,
        "uuid" => return TypeCategory::Uuid,
        "year" | "bit" | "oid" => return TypeCategory::Integer,
        _ => {}
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Unknown
}

/// Placeholder for a non-null value the driver cannot decode.
pub fn unsupported_value(type_name: &str) -> JsonValue {
    JsonValue::String(format!("<unsupported type: {}>", type_name))
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // Both MySQL protocols send DECIMAL as text
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
                Ok(RawDecimal(s.to_string()))
            }
            PgValueFormat::Binary => {
                let bytes = <&[u8] as Decode<sqlx::Postgres>>::decode(value)?;
                pg_numeric_text(bytes)
                    .map(RawDecimal)
                    .ok_or_else(|| "malformed binary NUMERIC".into())
            }
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as decimal text.
pub fn pg_numeric_text(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 {
        return None;
    }
    let read = |i: usize| i16::from_be_bytes([bytes[i], bytes[i + 1]]);
    let ndigits = usize::try_from(read(0)).ok()?;
    let weight = i32::from(read(2));
    let sign = read(4) as u16;
    let dscale = usize::try_from(read(6)).ok()?;
    if bytes.len() < 8 + ndigits * 2 {
        return None;
    }

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits: Vec<i16> = (0..ndigits).map(|i| read(8 + i * 2)).collect();
    let digit = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", digit(i)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut k = 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(weight + k)));
            k += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

// =============================================================================
// Binary and Temporal Encoding
// =============================================================================

/// Decode binary data to JSON value.
///
/// Valid UTF-8 is returned as text, anything else as base64.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn uuid_text(bytes: &[u8]) -> Option<String> {
    uuid::Uuid::from_slice(bytes).ok().map(|u| u.hyphenated().to_string())
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn timestamp_text(v: chrono::NaiveDateTime) -> String {
    v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to positional JSON values.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_values(&self) -> Vec<JsonValue>;
}

impl RowToJson for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, type_name, category)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, type_name, category)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::SQLite);
                sqlite::decode_column(self, idx, type_name, category)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return JsonValue::Null,
            Ok(_) => {}
            Err(_) => return unsupported_value(type_name),
        }

        let decoded = match category {
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| decode_binary_value(&v)),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Timestamp => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .map(|v| JsonValue::String(timestamp_text(v))),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_rfc3339())),
            _ => None,
        };

        decoded
            .or_else(|| decode_text(row, idx))
            .unwrap_or_else(|| unsupported_value(type_name))
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        // Unsigned columns
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        row.try_get::<u8, _>(idx)
            .ok()
            .map(|v| JsonValue::Number(v.into()))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_value(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_value(f64::from(v)))
    }

    /// Text fallback for ENUM, SET and other string-shaped types.
    fn decode_text(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Some(JsonValue::String(v));
        }
        let value = row.try_get_raw(idx).ok()?;
        let s = <&str as Decode<sqlx::MySql>>::decode(value).ok()?;
        Some(JsonValue::String(s.to_string()))
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::postgres::types::Oid;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return JsonValue::Null,
            Ok(_) => {}
            Err(_) => return unsupported_value(type_name),
        }

        let decoded = match category {
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| decode_binary_value(&v)),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
            TypeCategory::Text => row.try_get::<String, _>(idx).ok().map(JsonValue::String),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Timestamp => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .map(|v| JsonValue::String(timestamp_text(v))),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_rfc3339())),
            TypeCategory::Uuid | TypeCategory::Unknown => None,
        };

        decoded
            .or_else(|| decode_raw(row, idx, category))
            .unwrap_or_else(|| unsupported_value(type_name))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        row.try_get::<Oid, _>(idx)
            .ok()
            .map(|v| JsonValue::Number(v.0.into()))
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_value(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_value(f64::from(v)))
    }

    /// Text-format values are always readable as strings; binary ones only
    /// for types with a known layout.
    fn decode_raw(row: &PgRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        let value = row.try_get_raw(idx).ok()?;
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value).ok()?;
                Some(JsonValue::String(s.to_string()))
            }
            PgValueFormat::Binary if category == TypeCategory::Uuid => {
                let bytes = <&[u8] as Decode<sqlx::Postgres>>::decode(value).ok()?;
                uuid_text(bytes).map(JsonValue::String)
            }
            PgValueFormat::Binary => None,
        }
    }
}

mod sqlite {
    use super::*;
    use chrono::NaiveDateTime;

    /// SQLite values carry their own storage class, which wins over the
    /// declared column type (expression columns have none).
    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return JsonValue::Null,
            Ok(value) => value.type_info().name().to_uppercase(),
            Err(_) => return unsupported_value(type_name),
        };

        let decoded = match storage.as_str() {
            "INTEGER" if category == TypeCategory::Boolean => {
                row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool)
            }
            "INTEGER" => row
                .try_get::<i64, _>(idx)
                .ok()
                .map(|v| JsonValue::Number(v.into())),
            "REAL" => row.try_get::<f64, _>(idx).ok().map(float_value),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| decode_binary_value(&v)),
            _ => decode_text(row, idx, category),
        };

        decoded.unwrap_or_else(|| unsupported_value(type_name))
    }

    fn decode_text(row: &SqliteRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            if category == TypeCategory::Json {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return Some(json);
                }
            }
            return Some(JsonValue::String(v));
        }
        row.try_get::<NaiveDateTime, _>(idx)
            .ok()
            .map(|v| JsonValue::String(timestamp_text(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INT8", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_does_not_mistake_text_or_interval() {
        assert_eq!(
            categorize_type("TINYTEXT", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
        assert_eq!(
            categorize_type("POINT", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::TimestampTz
        );
        assert_eq!(
            categorize_type("TIMESTAMP", DatabaseType::PostgreSQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("TIMESTAMP", DatabaseType::MySQL),
            TypeCategory::TimestampTz
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::SQLite),
            TypeCategory::Date
        );
    }

    #[test]
    fn test_pg_numeric_text() {
        // 123.45: ndigits=2, weight=0, sign=+, dscale=2, digits [123, 4500]
        let bytes = [0, 2, 0, 0, 0, 0, 0, 2, 0, 123, 0x11, 0x94];
        assert_eq!(pg_numeric_text(&bytes).as_deref(), Some("123.45"));

        // -0.001: ndigits=1, weight=-1, sign=-, dscale=3, digits [10]
        let bytes = [0, 1, 0xFF, 0xFF, 0x40, 0, 0, 3, 0, 10];
        assert_eq!(pg_numeric_text(&bytes).as_deref(), Some("-0.001"));

        // 10000: ndigits=1, weight=1, digits [1]
        let bytes = [0, 1, 0, 1, 0, 0, 0, 0, 0, 1];
        assert_eq!(pg_numeric_text(&bytes).as_deref(), Some("10000"));

        assert_eq!(pg_numeric_text(&[0, 0]), None);
    }

    #[test]
    fn test_uuid_text() {
        let bytes: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            uuid_text(&bytes).as_deref(),
            Some("00010203-0405-0607-0809-0a0b0c0d0e0f")
        );
        assert_eq!(uuid_text(&[1, 2, 3]), None);
    }

    #[test]
    fn test_unsupported_value_is_not_null() {
        let value = unsupported_value("GEOMETRY");
        assert_eq!(value, JsonValue::String("<unsupported type: GEOMETRY>".into()));
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(
            decode_binary_value(b"hello world"),
            JsonValue::String("hello world".to_string())
        );
        let bytes: &[u8] = &[0xFF, 0xFE, 0x00, 0x01];
        assert_eq!(
            decode_binary_value(bytes),
            JsonValue::String("//4AAQ==".to_string())
        );
    }
}
