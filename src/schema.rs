//! Destination table schema model.
//!
//! A [`SchemaColumn`] describes one column of the destination table: its name,
//! its declared type name exactly as the store reports it, and its 1-based
//! ordinal position. Column names compare case-insensitively everywhere in
//! this crate; [`SchemaColumn::lookup_key`] is the canonical comparison form.
//!
//! The [`SchemaDescriptor`] trait is the narrow interface the loader uses to
//! obtain a table's columns once, before any row is read. The concrete
//! implementation lives in [`crate::store`].

use anyhow::Error as AnyError;
use thiserror::Error;

/// One column of the destination table, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    /// Declared type name as reported by the store, e.g. `INTEGER`,
    /// `NUMERIC(10,2)`, `TIMESTAMP`. Drives value coercion by substring
    /// matching, so dialect variants need no exhaustive table.
    pub type_name: String,
    /// 1-based position in the destination table.
    pub ordinal: usize,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ordinal,
        }
    }

    /// Canonical form used for case-insensitive name comparison.
    pub fn lookup_key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Supplies the ordered column list of a named destination table.
///
/// Called exactly once per load, before the first row is read; failures here
/// are fatal and abort the load with no transaction work done.
pub trait SchemaDescriptor {
    fn columns(&self, table: &str) -> Result<Vec<SchemaColumn>, SchemaError>;
}

/// Fatal schema resolution failures.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table '{table}' does not exist in the destination database")]
    UnknownTable { table: String },
    #[error("cannot resolve columns for table '{table}'")]
    Unavailable {
        table: String,
        #[source]
        source: AnyError,
    },
}
