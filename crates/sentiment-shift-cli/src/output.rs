//! Terminal output
//!
//! Command results go to stdout: a table for people, or a JSON/YAML document
//! for scripts. One-line status messages accompany tables; failures go to
//! stderr.

use std::fmt::Display;

use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::CliResult;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table with status lines
    #[default]
    Table,
    /// Pretty-printed JSON document
    Json,
    /// YAML document
    Yaml,
}

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A file was written or a command finished.
    Done,
    /// Run summary.
    Note,
    /// Nothing matched.
    Empty,
    /// The command failed.
    Failed,
}

impl Status {
    fn marker(self) -> ColoredString {
        match self {
            Self::Done => "✓".green(),
            Self::Note => "ℹ".blue(),
            Self::Empty => "⚠".yellow(),
            Self::Failed => "✗".red(),
        }
    }
}

/// `<marker> <message>`
pub fn render_status(kind: Status, message: impl Display) -> String {
    format!("{} {}", kind.marker(), message)
}

/// Print a status line; failures go to stderr.
pub fn status(kind: Status, message: impl Display) {
    let line = render_status(kind, message);
    match kind {
        Status::Failed => eprintln!("{}", line),
        _ => println!("{}", line),
    }
}

/// Serialize `data` for a structured format; tables fall back to pretty JSON.
pub fn render_document<T: Serialize + ?Sized>(data: &T, format: OutputFormat) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Table | OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(data)?;
            text.push('\n');
            text
        }
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
    })
}

pub fn print_document<T: Serialize + ?Sized>(data: &T, format: OutputFormat) -> CliResult<()> {
    print!("{}", render_document(data, format)?);
    Ok(())
}

/// Print rows as a table, or as a document for the structured formats.
///
/// An empty table prints `empty` instead.
pub fn print_rows<T: Serialize + Tabled>(
    rows: Vec<T>,
    format: OutputFormat,
    empty: &str,
) -> CliResult<()> {
    match format {
        OutputFormat::Table if rows.is_empty() => println!("{}", empty.dimmed()),
        OutputFormat::Table => println!("{}", Table::new(rows)),
        _ => print_document(&rows, format)?,
    }
    Ok(())
}
