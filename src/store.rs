//! Transactional destination store.
//!
//! Two narrow contracts the insert pipeline consumes:
//!
//! - [`TransactionController`]: the begin-savepoint / rollback-to /
//!   rollback-all / commit primitives. The pipeline owns the savepoint chain
//!   for the duration of a load but never commits; that is the caller's call.
//! - [`RowInserter`]: binds one row's coerced values to the prepared insert
//!   statement and executes it.
//!
//! [`SqliteStore`] implements both (plus [`SchemaDescriptor`]) over a single
//! `rusqlite` connection. Savepoints are plain SQL `SAVEPOINT sp_<n>`
//! markers with a monotonically increasing sequence; `ROLLBACK TO` keeps the
//! named savepoint alive, so the live marker survives a skipped row. Earlier
//! savepoints are left for `COMMIT`/`ROLLBACK` to discard, since releasing
//! an older SQLite savepoint would discard every later one with it.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{
    Connection, ToSql,
    types::{ToSqlOutput, Value, ValueRef},
};
use thiserror::Error;

use crate::{
    data::TypedValue,
    reconcile::ColumnMapping,
    schema::{SchemaColumn, SchemaDescriptor, SchemaError},
};

/// Opaque marker for a point the transaction can roll back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint(u64);

impl Savepoint {
    fn sql_name(&self) -> String {
        format!("sp_{}", self.0)
    }
}

/// The store rejected a row at execution time (constraint violation,
/// store-level type error). Per-row and recoverable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("destination store rejected the row: {message}")]
pub struct ExecutionError {
    pub message: String,
}

impl From<rusqlite::Error> for ExecutionError {
    fn from(err: rusqlite::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// Transaction primitives of the destination store.
pub trait TransactionController {
    fn begin_savepoint(&mut self) -> Result<Savepoint>;
    fn rollback_to(&mut self, savepoint: &Savepoint) -> Result<()>;
    /// Rolls back to the transaction's start, undoing every insert of the load.
    fn rollback_all(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
}

/// Executes the prepared insert for one row of coerced values.
pub trait RowInserter {
    fn insert_row(&mut self, values: &[TypedValue]) -> Result<(), ExecutionError>;
}

/// SQLite-backed destination store over a single connection.
pub struct SqliteStore {
    conn: Connection,
    insert_sql: Option<String>,
    savepoint_seq: u64,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Opening destination database {path:?}"))?;
        Ok(Self::from_connection(conn))
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Opening in-memory database")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            insert_sql: None,
            savepoint_seq: 0,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Builds the insert statement for the mapping's matched columns only.
    ///
    /// Destination columns absent from the mapping are not named and fall out
    /// to the store's NULL/default behavior. Parameter positions follow the
    /// mapping's matched order, the same order the pipeline binds values in.
    pub fn prepare_insert(&mut self, table: &str, mapping: &ColumnMapping) -> Result<()> {
        let columns = mapping
            .matched
            .iter()
            .map(|m| quote_ident(&m.column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; mapping.matched.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            quote_ident(table)
        );
        debug!("Prepared insert: {sql}");
        // Fail now, not on the first row, if the statement is unpreparable.
        self.conn
            .prepare_cached(&sql)
            .with_context(|| format!("Preparing insert statement for table '{table}'"))?;
        self.insert_sql = Some(sql);
        Ok(())
    }

    /// Opens the load transaction. Must precede the first savepoint.
    pub fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("Beginning load transaction")?;
        Ok(())
    }
}

impl SchemaDescriptor for SqliteStore {
    fn columns(&self, table: &str) -> Result<Vec<SchemaColumn>, SchemaError> {
        let describe = || -> rusqlite::Result<Vec<SchemaColumn>> {
            let mut stmt = self
                .conn
                .prepare("SELECT cid, name, type FROM pragma_table_info(?1) ORDER BY cid")?;
            let rows = stmt.query_map([table], |row| {
                let cid: usize = row.get(0)?;
                let name: String = row.get(1)?;
                let type_name: String = row.get(2)?;
                Ok(SchemaColumn::new(name, type_name, cid + 1))
            })?;
            rows.collect()
        };
        let columns = describe().map_err(|err| SchemaError::Unavailable {
            table: table.to_string(),
            source: err.into(),
        })?;
        if columns.is_empty() {
            return Err(SchemaError::UnknownTable {
                table: table.to_string(),
            });
        }
        Ok(columns)
    }
}

impl TransactionController for SqliteStore {
    fn begin_savepoint(&mut self) -> Result<Savepoint> {
        self.savepoint_seq += 1;
        let savepoint = Savepoint(self.savepoint_seq);
        self.conn
            .execute_batch(&format!("SAVEPOINT {}", savepoint.sql_name()))
            .with_context(|| format!("Creating savepoint {}", savepoint.sql_name()))?;
        Ok(savepoint)
    }

    fn rollback_to(&mut self, savepoint: &Savepoint) -> Result<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO {}", savepoint.sql_name()))
            .with_context(|| format!("Rolling back to savepoint {}", savepoint.sql_name()))?;
        Ok(())
    }

    fn rollback_all(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context("Rolling back load transaction")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Committing load transaction")?;
        Ok(())
    }
}

impl RowInserter for SqliteStore {
    fn insert_row(&mut self, values: &[TypedValue]) -> Result<(), ExecutionError> {
        let sql = self.insert_sql.as_ref().ok_or_else(|| ExecutionError {
            message: "no insert statement prepared".to_string(),
        })?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        Ok(())
    }
}

impl ToSql for TypedValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            TypedValue::Null => Ok(ToSqlOutput::Owned(Value::Null)),
            TypedValue::Integer(i) => Ok(ToSqlOutput::Owned(Value::Integer(*i))),
            TypedValue::Float(x) => Ok(ToSqlOutput::Owned(Value::Real(*x))),
            TypedValue::Timestamp(ts) => ts.to_sql(),
            TypedValue::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
