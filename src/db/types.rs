//! MySQL type mappings.
//!
//! This module is the single place where driver values become [`SqlValue`]s.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's MySQL type name into a logical category
//! 2. A per-category decoder extracts the value, falling back to text and then
//!    raw bytes when the driver refuses the preferred Rust type
//!
//! NULL is checked once per cell before any decoding happens.

use crate::models::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Unsigned,
    Float,
    Decimal,
    Boolean,
    Bit,
    Date,
    Time,
    DateTime,
    Timestamp,
    Text,
    Binary,
    Null,
}

/// Classify a MySQL type name (as reported by the driver) into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let upper = type_name.trim().to_uppercase();

    // TINYINT(1) is reported as BOOLEAN
    if upper == "BOOLEAN" || upper == "BOOL" {
        return TypeCategory::Boolean;
    }

    let (base, unsigned) = match upper.strip_suffix(" UNSIGNED") {
        Some(base) => (base, true),
        None => (upper.as_str(), false),
    };

    match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" if unsigned => {
            TypeCategory::Unsigned
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            TypeCategory::Integer
        }
        "FLOAT" | "DOUBLE" | "REAL" => TypeCategory::Float,
        "DECIMAL" | "NUMERIC" => TypeCategory::Decimal,
        "BIT" => TypeCategory::Bit,
        "DATE" => TypeCategory::Date,
        "TIME" => TypeCategory::Time,
        "DATETIME" => TypeCategory::DateTime,
        "TIMESTAMP" => TypeCategory::Timestamp,
        "NULL" => TypeCategory::Null,
        other if other.contains("BLOB") || other.contains("BINARY") => TypeCategory::Binary,
        // CHAR, VARCHAR, TEXT, ENUM, SET, JSON, GEOMETRY, ...
        _ => TypeCategory::Text,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact server representation until we pick a variant.
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
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Numeric DECIMAL text becomes a float; anything unparsable keeps its text.
pub fn decimal_value(text: String) -> SqlValue {
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => SqlValue::Float(v),
        _ => SqlValue::String(text),
    }
}

/// Unsigned integers that do not fit `i64` are widened to a float.
pub fn unsigned_value(v: u64) -> SqlValue {
    match i64::try_from(v) {
        Ok(v) => SqlValue::Int(v),
        Err(_) => SqlValue::Float(v as f64),
    }
}

// =============================================================================
// Row Conversion Trait
// =============================================================================

/// A cursor row that can be copied out into detached values.
pub trait RowToValues {
    /// Column names in select-list order.
    fn column_names(&self) -> Vec<String>;
    /// Cell values, positionally aligned with `column_names`.
    fn to_values(&self) -> Vec<SqlValue>;
}

impl RowToValues for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }

    fn to_values(&self) -> Vec<SqlValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| decode_column(self, idx, categorize_type(col.type_info().name())))
            .collect()
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Decode one cell of `row` according to its category.
pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return SqlValue::Null,
        Ok(_) => {}
        Err(e) => {
            tracing::error!(column = idx, error = %e, "Failed to read column");
            return SqlValue::Null;
        }
    }

    let decoded = match category {
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Unsigned | TypeCategory::Bit => decode_unsigned(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Date => get::<NaiveDate>(row, idx).map(|v| SqlValue::String(v.to_string())),
        TypeCategory::Time => get::<NaiveTime>(row, idx).map(|v| SqlValue::String(v.to_string())),
        TypeCategory::DateTime => get::<NaiveDateTime>(row, idx)
            .map(|v| SqlValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        TypeCategory::Timestamp => get::<DateTime<Utc>>(row, idx)
            .map(|v| SqlValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        TypeCategory::Binary => get::<Vec<u8>>(row, idx).map(SqlValue::Bytes),
        TypeCategory::Text | TypeCategory::Null => None,
    };

    decoded.unwrap_or_else(|| decode_fallback(row, idx))
}

fn get<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<T>
where
    T: Decode<'r, sqlx::MySql> + Type<sqlx::MySql>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn decode_integer(row: &MySqlRow, idx: usize) -> Option<SqlValue> {
    if let Some(v) = get::<i64>(row, idx) {
        return Some(SqlValue::Int(v));
    }
    if let Some(v) = get::<i32>(row, idx) {
        return Some(SqlValue::Int(v.into()));
    }
    if let Some(v) = get::<i16>(row, idx) {
        return Some(SqlValue::Int(v.into()));
    }
    if let Some(v) = get::<u16>(row, idx) {
        return Some(SqlValue::Int(v.into()));
    }
    if let Some(v) = get::<i8>(row, idx) {
        return Some(SqlValue::Int(v.into()));
    }
    None
}

fn decode_unsigned(row: &MySqlRow, idx: usize) -> Option<SqlValue> {
    if let Some(v) = get::<u64>(row, idx) {
        return Some(unsigned_value(v));
    }
    if let Some(v) = get::<u32>(row, idx) {
        return Some(SqlValue::Int(v.into()));
    }
    if let Some(v) = get::<u8>(row, idx) {
        return Some(SqlValue::Int(v.into()));
    }
    // Narrow BIT columns may still be signed-compatible
    get::<i64>(row, idx).map(SqlValue::Int)
}

fn decode_float(row: &MySqlRow, idx: usize) -> Option<SqlValue> {
    if let Some(v) = get::<f64>(row, idx) {
        return Some(SqlValue::Float(v));
    }
    get::<f32>(row, idx).map(|v| SqlValue::Float(v.into()))
}

fn decode_decimal(row: &MySqlRow, idx: usize) -> Option<SqlValue> {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(v) => v.map(|d| decimal_value(d.0)),
        Err(e) => {
            tracing::error!(column = idx, error = ?e, "Failed to decode DECIMAL");
            None
        }
    }
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> Option<SqlValue> {
    if let Some(v) = get::<bool>(row, idx) {
        return Some(SqlValue::Bool(v));
    }
    get::<i8>(row, idx).map(|v| SqlValue::Bool(v != 0))
}

/// Text first, then raw bytes; a cell that is neither reads as NULL.
fn decode_fallback(row: &MySqlRow, idx: usize) -> SqlValue {
    if let Some(v) = get::<String>(row, idx) {
        return SqlValue::String(v);
    }
    if let Some(v) = get::<Vec<u8>>(row, idx) {
        return match String::from_utf8(v) {
            Ok(s) => SqlValue::String(s),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        };
    }
    tracing::warn!(column = idx, "Column type could not be decoded; reading as NULL");
    SqlValue::Null
}
