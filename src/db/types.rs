//! MySQL/MariaDB column type mappings.
//!
//! This module converts result rows into JSON maps and column metadata.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Per-category decoders handle the actual value extraction
//!
//! Values that cannot be decoded become `null` and are logged, so a single odd
//! column never fails the whole result set.

use crate::models::ColumnMetadata;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlColumn, MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    UnsignedInteger,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    Time,
    DateTime,
    Timestamp,
    Unknown,
}

/// Classify a MySQL type name (as reported by the driver) into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let upper = type_name.to_ascii_uppercase();
    let (base, unsigned) = match upper.strip_suffix(" UNSIGNED") {
        Some(base) => (base, true),
        None => (upper.as_str(), false),
    };

    match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            if unsigned {
                TypeCategory::UnsignedInteger
            } else {
                TypeCategory::Integer
            }
        }
        "BOOLEAN" | "BOOL" => TypeCategory::Boolean,
        "FLOAT" | "DOUBLE" | "REAL" => TypeCategory::Float,
        "DECIMAL" | "NUMERIC" => TypeCategory::Decimal,
        "JSON" => TypeCategory::Json,
        "DATE" => TypeCategory::Date,
        "TIME" => TypeCategory::Time,
        "DATETIME" => TypeCategory::DateTime,
        "TIMESTAMP" => TypeCategory::Timestamp,
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            TypeCategory::Text
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => TypeCategory::Binary,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_ascii_uppercase();
        name.starts_with("DECIMAL") || name.starts_with("NUMERIC")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary column data as a JSON string.
///
/// Valid UTF-8 is returned as text, anything else as base64.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn get_column_metadata(&self) -> Vec<ColumnMetadata>;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let value = decode_column(self, idx, categorize_type(type_name));
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        columns_metadata(self.columns())
    }
}

/// Column metadata for a result set, whether or not any row arrived.
pub fn columns_metadata(columns: &[MySqlColumn]) -> Vec<ColumnMetadata> {
    columns
        .iter()
        .map(|col| {
            ColumnMetadata::new(
                col.name(),
                col.type_info().name(),
                !col.type_info().is_null(),
            )
        })
        .collect()
}

// =============================================================================
// Decoders
// =============================================================================

fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::UnsignedInteger => decode_unsigned(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Date => decode_temporal::<chrono::NaiveDate>(row, idx),
        TypeCategory::Time => decode_temporal::<chrono::NaiveTime>(row, idx),
        TypeCategory::DateTime => decode_temporal::<chrono::NaiveDateTime>(row, idx),
        TypeCategory::Timestamp => decode_temporal::<chrono::DateTime<chrono::Utc>>(row, idx),
        TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx),
    }
}

fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!(column = idx, error = %e, "Failed to decode DECIMAL");
            JsonValue::Null
        }
    }
}

/// Decode a non-null integer as `T`, `None` when the column is NULL or `T` does not fit.
fn try_number<T>(row: &MySqlRow, idx: usize) -> Option<serde_json::Number>
where
    T: for<'r> Decode<'r, sqlx::MySql> + Type<sqlx::MySql> + Into<serde_json::Number>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten().map(Into::into)
}

// the driver widens every signed width to i64 and every unsigned width to u64;
// YEAR only decodes as u16
fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
    try_number::<i64>(row, idx)
        .or_else(|| try_number::<u16>(row, idx))
        .map_or(JsonValue::Null, JsonValue::Number)
}

fn decode_unsigned(row: &MySqlRow, idx: usize) -> JsonValue {
    try_number::<u64>(row, idx)
        .or_else(|| try_number::<u16>(row, idx))
        .map_or(JsonValue::Null, JsonValue::Number)
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| decode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
    // MariaDB reports JSON as LONGTEXT, so fall back to parsing the text
    if let Ok(Some(v)) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v;
    }
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(s)) => serde_json::from_str(&s).unwrap_or(JsonValue::String(s)),
        _ => JsonValue::Null,
    }
}

/// Date/time columns are rendered with their `Display` form
/// (`2024-03-01`, `10:15:00`, `2024-03-01 10:15:00`, RFC 3339 for TIMESTAMP).
fn decode_temporal<T>(row: &MySqlRow, idx: usize) -> JsonValue
where
    T: for<'r> Decode<'r, sqlx::MySql> + Type<sqlx::MySql> + ToTemporalString,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.to_temporal_string()),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            // zero dates ('0000-00-00') do not map onto chrono types
            tracing::debug!(column = idx, error = %e, "Failed to decode temporal value");
            JsonValue::Null
        }
    }
}

trait ToTemporalString {
    fn to_temporal_string(&self) -> String;
}

impl ToTemporalString for chrono::NaiveDate {
    fn to_temporal_string(&self) -> String {
        self.to_string()
    }
}

impl ToTemporalString for chrono::NaiveTime {
    fn to_temporal_string(&self) -> String {
        self.to_string()
    }
}

impl ToTemporalString for chrono::NaiveDateTime {
    fn to_temporal_string(&self) -> String {
        self.to_string()
    }
}

impl ToTemporalString for chrono::DateTime<chrono::Utc> {
    fn to_temporal_string(&self) -> String {
        self.to_rfc3339()
    }
}

fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    // unknown types may still carry bytes
    row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| decode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("tinyint"), TypeCategory::Integer);
        assert_eq!(
            categorize_type("BIGINT UNSIGNED"),
            TypeCategory::UnsignedInteger
        );
    }

    #[test]
    fn test_categorize_type_does_not_match_substrings() {
        assert_eq!(categorize_type("POINT"), TypeCategory::Unknown);
        assert_eq!(categorize_type("GEOMETRY"), TypeCategory::Binary);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("TIME"), TypeCategory::Time);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::DateTime);
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::Timestamp);
    }

    #[test]
    fn test_categorize_type_misc() {
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize_type("DOUBLE"), TypeCategory::Float);
        assert_eq!(categorize_type("JSON"), TypeCategory::Json);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("LONGBLOB"), TypeCategory::Binary);
    }

    #[test]
    fn test_decode_binary_value_with_valid_utf8() {
        let result = decode_binary_value(b"hello world");
        assert_eq!(result, JsonValue::String("hello world".to_string()));
    }

    #[test]
    fn test_decode_binary_value_with_invalid_utf8() {
        let bytes: &[u8] = &[0xFF, 0xFE, 0x00, 0x01];
        assert_eq!(
            decode_binary_value(bytes),
            JsonValue::String("//4AAQ==".to_string())
        );
    }

    #[test]
    fn test_temporal_strings() {
        use chrono::{NaiveDate, TimeZone, Utc};
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(date.to_temporal_string(), "2024-03-01");
        let dt = date.and_hms_opt(10, 15, 0).unwrap();
        assert_eq!(dt.to_temporal_string(), "2024-03-01 10:15:00");
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(ts.to_temporal_string(), "2024-03-01T10:15:00+00:00");
    }
}
