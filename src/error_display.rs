//! User-facing error message formatting.
//!
//! Matches on typed errors (DatasetError, PolarsError variants, io::ErrorKind)
//! rather than parsing strings.

use polars::prelude::PolarsError;
use std::io;
use std::path::Path;

use crate::error::{DatasetError, RejectionReason};
use crate::source::MOLBLOCK_COLUMN;

pub fn user_message_from_dataset(err: &DatasetError) -> String {
    match err {
        DatasetError::MissingStructureColumn(name) => format!(
            "No `{}` column found. Pick the column holding structures with --structure-column \
             (SDF files without a SMILES item can use --structure-column {}).",
            name, MOLBLOCK_COLUMN
        ),
        DatasetError::UnsupportedFormat(path) => format!(
            "Unsupported file type: {}. Use an .sdf, .csv or .tsv file (optionally .gz) or pass --format.",
            path.display()
        ),
        DatasetError::Empty(path) => format!("{} contains no records.", path.display()),
        DatasetError::Sdf { record, message } => {
            format!("SDF record {} is malformed: {}", record, message)
        }
        DatasetError::Schema(msg) => format!("Inconsistent table: {}", msg),
        DatasetError::Io { path, source } => format!(
            "Failed to load {}: {}",
            path.display(),
            user_message_from_io(source, None)
        ),
        DatasetError::Csv(e) => user_message_from_polars(e),
    }
}

/// Safety violations get their own wording so they read as a refusal, not a typo.
pub fn user_message_from_rejection(reason: &RejectionReason) -> String {
    if reason.is_safety_violation() {
        format!("Filter refused: {}", reason)
    } else {
        format!("Invalid filter: {}", reason)
    }
}

/// CSV reader failures. Polars wraps most parse problems as `ComputeError`.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    match err {
        PolarsError::IO { error, msg } => {
            user_message_from_io(error, msg.as_ref().map(|m| m.as_ref()))
        }
        PolarsError::Context { error, msg } => {
            format!("{}: {}", msg, user_message_from_polars(error))
        }
        PolarsError::ColumnNotFound(msg) => format!("Column not found: {}", msg),
        PolarsError::Duplicate(msg) => format!("Header repeats a column name: {}", msg),
        PolarsError::NoData(_) => "The file has no rows.".to_string(),
        PolarsError::ComputeError(msg)
        | PolarsError::SchemaMismatch(msg)
        | PolarsError::ShapeMismatch(msg) => format!(
            "Could not read the table ({}). Check --delimiter and --infer-schema-length.",
            msg
        ),
        other => other.to_string(),
    }
}

pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    let base = match err.kind() {
        io::ErrorKind::NotFound => "not found".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        io::ErrorKind::IsADirectory => "is a directory, not a file".to_string(),
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            "truncated or corrupted (a damaged .gz file reads like this)".to_string()
        }
        _ => err.to_string(),
    };
    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} ({})", base, ctx),
        _ => base,
    }
}

/// Walks the report's causes for a typed error before falling back to its first line.
pub fn user_message_from_report(report: &color_eyre::eyre::Report, path: Option<&Path>) -> String {
    let with_path = |msg: String| match path {
        Some(p) => format!("Failed to load {}: {}", p.display(), msg),
        None => msg,
    };
    for cause in report.chain() {
        if let Some(de) = cause.downcast_ref::<DatasetError>() {
            return user_message_from_dataset(de);
        }
        if let Some(pe) = cause.downcast_ref::<PolarsError>() {
            return with_path(user_message_from_polars(pe));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_path(user_message_from_io(io_err, None));
        }
    }

    // First line only; eyre reports can carry long sections.
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    with_path(first_line.trim().to_string())
}
