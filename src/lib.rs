pub mod cli;
pub mod data;
pub mod io_utils;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod source;
pub mod store;

use std::{env, sync::OnceLock};

use anyhow::{Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, ColumnsArgs, Commands, LoadArgs, OnRowError},
    pipeline::{FixedPolicy, LoadOutcome, PromptPolicy, RecoveryPolicy, RowDecision, RowSource},
    reconcile::reconcile,
    schema::SchemaDescriptor,
    source::DelimitedRowSource,
    store::{SqliteStore, TransactionController},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_dbload", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Columns(args) => handle_columns(&args),
    }
}

fn handle_load(args: &LoadArgs) -> Result<()> {
    if args.on_error == OnRowError::Prompt && io_utils::is_dash(&args.input) {
        bail!("--on-error prompt cannot be combined with reading input from stdin");
    }
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Loading '{}' into table '{}' of {:?} (delimiter '{}')",
        args.input.display(),
        args.table,
        args.database,
        io_utils::printable_delimiter(delimiter)
    );

    let mut store = SqliteStore::open(&args.database)?;
    let schema = store.columns(&args.table)?;
    let mut source = DelimitedRowSource::open(&args.input, delimiter, encoding)?;
    let header = source.header_fields()?;
    let mapping = reconcile(&header, &schema)?;
    for warning in mapping.warnings() {
        warn!("{warning}");
    }
    info!(
        "Matched {} of {} source field(s) to table columns",
        mapping.matched.len(),
        mapping.header_len()
    );

    store.prepare_insert(&args.table, &mapping)?;
    let mut policy: Box<dyn RecoveryPolicy> = match args.on_error {
        OnRowError::Prompt => Box::new(PromptPolicy::new(
            std::io::stdin().lock(),
            std::io::stderr(),
        )),
        OnRowError::Skip => Box::new(FixedPolicy(RowDecision::Skip)),
        OnRowError::Abort => Box::new(FixedPolicy(RowDecision::Abort)),
    };

    store.begin()?;
    let summary = pipeline::run_load(&mut source, &mut store, &mapping, &mut policy)?;
    match summary.outcome {
        LoadOutcome::Completed => {
            store.commit()?;
            info!(
                "Committed {} row(s) into '{}' ({} skipped of {} read)",
                summary.rows_inserted, args.table, summary.rows_skipped, summary.rows_read
            );
            Ok(())
        }
        LoadOutcome::Aborted { row_ordinal, reason } => {
            bail!(
                "Load aborted at row {row_ordinal}: {reason}; all {} earlier insert(s) rolled back",
                row_ordinal - 1 - summary.rows_skipped
            )
        }
    }
}

fn handle_columns(args: &ColumnsArgs) -> Result<()> {
    let store = SqliteStore::open(&args.database)?;
    let columns = store.columns(&args.table)?;
    let name_width = columns
        .iter()
        .map(|c| c.name.len())
        .chain(std::iter::once("column".len()))
        .max()
        .unwrap_or(6);
    let type_width = columns
        .iter()
        .map(|c| c.type_name.len())
        .chain(std::iter::once("type".len()))
        .max()
        .unwrap_or(4);
    println!("{:<name_width$}  {:<type_width$}  ordinal", "column", "type");
    println!("{:-<name_width$}  {:-<type_width$}  -------", "", "");
    for column in &columns {
        println!(
            "{:<name_width$}  {:<type_width$}  {}",
            column.name, column.type_name, column.ordinal
        );
    }
    Ok(())
}
