//! Typed values and text-to-value coercion.
//!
//! Raw fields arrive as untyped text; [`coerce()`] turns one field into a
//! [`TypedValue`] according to the destination column's declared type name.
//! Dispatch is an ordered, case-insensitive substring match on the type name
//! rather than an exact type enum, so dialect variants (`bigint`, `serial4`,
//! `numeric(10,2)`, `timestamp`) all land in the right bucket:
//!
//! 1. the literal `null` (any letter casing) is the null marker, checked
//!    before the type name is inspected at all;
//! 2. `int` / `serial` → 64-bit integer;
//! 3. `numeric` / `real` / `decimal` / `money` → double-precision float;
//! 4. `time` → timestamp in the fixed `YYYY-MM-DD HH:MM` form;
//! 5. anything else passes through unchanged as text.
//!
//! Bucket order matters and must not change: a type name carrying several
//! bucket substrings (e.g. `interval`, which contains `int`) resolves to the
//! earliest bucket.

use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::schema::SchemaColumn;

/// Accepted textual form for timestamp fields.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A coerced destination value for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Explicit no-value marker, produced by the literal `null` token.
    Null,
    Integer(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => write!(f, "NULL"),
            TypedValue::Integer(i) => write!(f, "{i}"),
            TypedValue::Float(x) => write!(f, "{x}"),
            TypedValue::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            TypedValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A field's text could not be parsed as its destination column's type.
///
/// Carries everything needed to display the failure without re-deriving it
/// from the row: column name, declared type, offending text, parse reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("column '{column}' ({type_name}): cannot coerce '{raw}': {reason}")]
pub struct CoercionError {
    pub column: String,
    pub type_name: String,
    pub raw: String,
    pub reason: String,
}

impl CoercionError {
    fn new(column: &SchemaColumn, raw: &str, reason: impl fmt::Display) -> Self {
        Self {
            column: column.name.clone(),
            type_name: column.type_name.clone(),
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Coerces one raw text field into the typed value for `column`.
pub fn coerce(raw: &str, column: &SchemaColumn) -> Result<TypedValue, CoercionError> {
    if raw.eq_ignore_ascii_case("null") {
        return Ok(TypedValue::Null);
    }
    let type_name = column.type_name.to_lowercase();
    if contains_any(&type_name, &["int", "serial"]) {
        return raw
            .parse::<i64>()
            .map(TypedValue::Integer)
            .map_err(|e| CoercionError::new(column, raw, e));
    }
    if contains_any(&type_name, &["numeric", "real", "decimal", "money"]) {
        return raw
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|e| CoercionError::new(column, raw, e));
    }
    if type_name.contains("time") {
        return NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .map(TypedValue::Timestamp)
            .map_err(|e| CoercionError::new(column, raw, e));
    }
    Ok(TypedValue::Text(raw.to_string()))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
