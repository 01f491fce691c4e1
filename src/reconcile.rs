//! Column reconciliation: matching source header fields to schema columns.
//!
//! [`reconcile()`] walks the header once, claiming destination columns by
//! case-insensitive name. Every header index lands in exactly one of three
//! buckets: matched, duplicate (a column already claimed by an earlier
//! field; first occurrence wins), or unmatched (no such destination column).
//! Destination columns nobody claimed are recorded separately; they are left
//! out of the insert statement and receive NULL.
//!
//! Mismatches are warnings for the caller to display, never errors. The only
//! failure is an empty match set, when there is nothing to insert at all.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use thiserror::Error;

use crate::schema::SchemaColumn;

/// One source field that uniquely matched a destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedColumn {
    /// 0-based index of the field in the header (and in every row).
    pub source_index: usize,
    pub column: SchemaColumn,
}

/// Result of reconciling a header against a table schema.
///
/// Computed once per load, immutable thereafter. `matched`,
/// `duplicate_source_fields`, and `unmatched_source_fields` partition the
/// header's field indexes.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    /// Uniquely matched fields, in header order.
    pub matched: Vec<MatchedColumn>,
    /// Header fields with no destination column, as `(index, name)`.
    pub unmatched_source_fields: Vec<(usize, String)>,
    /// Later occurrences of an already-claimed column, as `(index, name)`.
    pub duplicate_source_fields: Vec<(usize, String)>,
    /// Destination columns no source field claimed; they receive NULL.
    pub missing_destination_columns: Vec<SchemaColumn>,
    header_len: usize,
}

impl ColumnMapping {
    /// Field count every row must carry to be structurally valid.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn has_mismatches(&self) -> bool {
        !self.unmatched_source_fields.is_empty()
            || !self.duplicate_source_fields.is_empty()
            || !self.missing_destination_columns.is_empty()
    }

    /// Human-readable mismatch report, one line per warning class.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.unmatched_source_fields.is_empty() {
            warnings.push(format!(
                "Source field(s) {} have no destination column and will not be inserted",
                join_names(self.unmatched_source_fields.iter().map(|(_, name)| name))
            ));
        }
        if !self.duplicate_source_fields.is_empty() {
            warnings.push(format!(
                "Source field(s) {} appear more than once; later occurrences are ignored",
                join_names(self.duplicate_source_fields.iter().map(|(_, name)| name))
            ));
        }
        if !self.missing_destination_columns.is_empty() {
            warnings.push(format!(
                "Destination column(s) {} have no source field and will receive NULL",
                join_names(self.missing_destination_columns.iter().map(|c| &c.name))
            ));
        }
        warnings
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a String>) -> String {
    names.map(|name| format!("'{name}'")).join(", ")
}

/// Reconciliation produced zero matched columns; nothing can be inserted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("none of the {header_len} source field(s) matches a destination column; nothing to insert")]
pub struct NoUsableColumnsError {
    pub header_len: usize,
}

/// Computes the mapping between source header fields and schema columns.
///
/// Pure function of its inputs; accumulates mismatches instead of failing on
/// them. Fails only when no field matches any column.
pub fn reconcile(
    header_fields: &[String],
    schema: &[SchemaColumn],
) -> Result<ColumnMapping, NoUsableColumnsError> {
    let by_name: HashMap<String, &SchemaColumn> = schema
        .iter()
        .map(|column| (column.lookup_key(), column))
        .collect();

    let mut claimed: HashSet<String> = HashSet::new();
    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    let mut duplicates = Vec::new();

    for (index, field) in header_fields.iter().enumerate() {
        let key = field.to_lowercase();
        match by_name.get(&key) {
            None => unmatched.push((index, field.clone())),
            Some(_) if claimed.contains(&key) => duplicates.push((index, field.clone())),
            Some(column) => {
                claimed.insert(key);
                matched.push(MatchedColumn {
                    source_index: index,
                    column: (*column).clone(),
                });
            }
        }
    }

    if matched.is_empty() {
        return Err(NoUsableColumnsError {
            header_len: header_fields.len(),
        });
    }

    let missing = schema
        .iter()
        .filter(|column| !claimed.contains(&column.lookup_key()))
        .cloned()
        .collect();

    Ok(ColumnMapping {
        matched,
        unmatched_source_fields: unmatched,
        duplicate_source_fields: duplicates,
        missing_destination_columns: missing,
        header_len: header_fields.len(),
    })
}
