//! The row-by-row insert pipeline with savepoint-based recovery.
//!
//! [`run_load()`] drives one load inside an already-open transaction: for
//! each row it extracts the matched fields, coerces them, binds and executes
//! the insert, then advances the live savepoint. A failed row (wrong field
//! count, bad coercion, or store rejection) is handed to the
//! [`RecoveryPolicy`] as a [`RowError`], and its decision resolves the row:
//!
//! - **skip** rolls back to the live savepoint (undoing only that row's
//!   partial effect) and resumes with the next row;
//! - **abort** rolls back the whole transaction, undoing every insert of
//!   the load, and ends it.
//!
//! The pipeline never commits. On a [`LoadOutcome::Completed`] summary the
//! caller decides whether to commit; on `Aborted` the rollback has already
//! happened. Strictly sequential: the next row is not started until a failed
//! row's decision resolves, so a blocking interactive policy is safe.

use std::io::{BufRead, Write};

use anyhow::Result;
use log::{debug, warn};
use thiserror::Error;

use crate::{
    data::{CoercionError, TypedValue, coerce},
    reconcile::ColumnMapping,
    store::{ExecutionError, RowInserter, TransactionController},
};

/// Produces the source header once, then rows until end-of-input.
///
/// A row whose field count differs from the header's is not a source
/// failure; the pipeline surfaces it as a per-row [`RowError::Structure`].
pub trait RowSource {
    fn header_fields(&mut self) -> Result<Vec<String>>;
    fn next_row(&mut self) -> Result<Option<Vec<String>>>;
}

/// A single row failed; recoverable via the [`RecoveryPolicy`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("row has {actual} field(s) but the header declared {expected}")]
    Structure { expected: usize, actual: usize },
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Resolution of a failed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDecision {
    /// Undo the failed row only and continue with the next one.
    Skip,
    /// Undo every insert of this load and end it as failed.
    Abort,
}

/// Decides what happens to a failed row. May block (e.g. an interactive
/// prompt); no other row is in flight while it does.
pub trait RecoveryPolicy {
    fn on_row_error(&mut self, row_ordinal: u64, error: &RowError) -> RowDecision;
}

impl<P: RecoveryPolicy + ?Sized> RecoveryPolicy for Box<P> {
    fn on_row_error(&mut self, row_ordinal: u64, error: &RowError) -> RowDecision {
        (**self).on_row_error(row_ordinal, error)
    }
}

/// Applies the same decision to every failed row. Covers non-interactive
/// runs (`--on-error skip` / `--on-error abort`) and test doubles.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub RowDecision);

impl RecoveryPolicy for FixedPolicy {
    fn on_row_error(&mut self, _row_ordinal: u64, _error: &RowError) -> RowDecision {
        self.0
    }
}

/// Asks interactively on every failed row, reading `s`/`skip` or `a`/`abort`
/// (case-insensitive) from `input`. Unrecognized answers re-ask; end of
/// input aborts, so a closed terminal cannot silently swallow rows.
pub struct PromptPolicy<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptPolicy<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> RecoveryPolicy for PromptPolicy<R, W> {
    fn on_row_error(&mut self, row_ordinal: u64, error: &RowError) -> RowDecision {
        loop {
            let prompted = write!(
                self.output,
                "Row {row_ordinal} failed: {error}\nSkip this row or abort the load? [s/a] "
            )
            .and_then(|()| self.output.flush());
            if prompted.is_err() {
                return RowDecision::Abort;
            }
            let mut answer = String::new();
            match self.input.read_line(&mut answer) {
                Ok(0) | Err(_) => return RowDecision::Abort,
                Ok(_) => match answer.trim().to_lowercase().as_str() {
                    "s" | "skip" => return RowDecision::Skip,
                    "a" | "abort" => return RowDecision::Abort,
                    other => {
                        let _ = writeln!(self.output, "Unrecognized answer '{other}'");
                    }
                },
            }
        }
    }
}

/// How the whole load ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every row was processed (or skipped); the caller may commit.
    Completed,
    /// A failed row resolved to abort; the transaction is already rolled back.
    Aborted { row_ordinal: u64, reason: String },
}

/// Counters and terminal outcome of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub outcome: LoadOutcome,
}

/// Runs the insert pipeline over every remaining row of `source`.
///
/// Preconditions: the header has been consumed and reconciled into
/// `mapping`, the store's insert statement is prepared for that mapping, and
/// the load transaction is open. Hard source read failures propagate as
/// errors; per-row failures never do, they go through `policy`.
pub fn run_load<S, T, P>(
    source: &mut S,
    store: &mut T,
    mapping: &ColumnMapping,
    policy: &mut P,
) -> Result<LoadSummary>
where
    S: RowSource,
    T: TransactionController + RowInserter,
    P: RecoveryPolicy,
{
    let mut rows_read = 0u64;
    let mut rows_inserted = 0u64;
    let mut rows_skipped = 0u64;

    // Live savepoint starts at the transaction's beginning and advances
    // after every successfully executed row.
    let mut savepoint = store.begin_savepoint()?;

    while let Some(fields) = source.next_row()? {
        rows_read += 1;
        match insert_one(store, mapping, &fields) {
            Ok(()) => {
                savepoint = store.begin_savepoint()?;
                rows_inserted += 1;
                debug!("Row {rows_read} inserted");
            }
            Err(error) => {
                warn!("Row {rows_read} failed: {error}");
                match policy.on_row_error(rows_read, &error) {
                    RowDecision::Skip => {
                        store.rollback_to(&savepoint)?;
                        rows_skipped += 1;
                        debug!("Row {rows_read} skipped");
                    }
                    RowDecision::Abort => {
                        store.rollback_all()?;
                        return Ok(LoadSummary {
                            rows_read,
                            rows_inserted: 0,
                            rows_skipped,
                            outcome: LoadOutcome::Aborted {
                                row_ordinal: rows_read,
                                reason: error.to_string(),
                            },
                        });
                    }
                }
            }
        }
    }

    Ok(LoadSummary {
        rows_read,
        rows_inserted,
        rows_skipped,
        outcome: LoadOutcome::Completed,
    })
}

/// Coerces and executes one row: the BINDING and EXECUTING steps.
fn insert_one<T: RowInserter>(
    store: &mut T,
    mapping: &ColumnMapping,
    fields: &[String],
) -> Result<(), RowError> {
    if fields.len() != mapping.header_len() {
        return Err(RowError::Structure {
            expected: mapping.header_len(),
            actual: fields.len(),
        });
    }
    let mut values: Vec<TypedValue> = Vec::with_capacity(mapping.matched.len());
    for matched in &mapping.matched {
        values.push(coerce(&fields[matched.source_index], &matched.column)?);
    }
    store.insert_row(&values)?;
    Ok(())
}
