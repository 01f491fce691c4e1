use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about = "Bulk-load delimited text files into database tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a delimited text file into a destination table
    Load(LoadArgs),
    /// Show a destination table's columns, declared types, and ordinals
    Columns(ColumnsArgs),
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Destination SQLite database file
    #[arg(short, long)]
    pub database: PathBuf,
    /// Destination table name
    #[arg(short, long)]
    pub table: String,
    /// Input file with a header row ('-' reads from stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Field delimiter character (supports ',', 'tab', ';', '|'; defaults by extension)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// What to do with a failed row: ask on stderr/stdin, skip it, or abort the load
    #[arg(long = "on-error", value_enum, default_value_t = OnRowError::Prompt)]
    pub on_error: OnRowError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnRowError {
    /// Ask interactively for each failed row
    Prompt,
    /// Skip every failed row and keep loading
    Skip,
    /// Abort the load on the first failed row, rolling back everything
    Abort,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Destination SQLite database file
    #[arg(short, long)]
    pub database: PathBuf,
    /// Table whose columns to show
    #[arg(short, long)]
    pub table: String,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
