//! Error taxonomy for the filter/render/load pipeline.
//!
//! Only [`DatasetError`] is fatal for a pass. [`RejectionReason`] keeps the previous
//! view on screen and [`RenderError`] degrades a single row to an empty artifact.

use std::path::PathBuf;
use thiserror::Error;

/// Why a filter expression was refused. Always shown to the user; a rejected
/// expression is never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("unsafe token `{token}` is not allowed in filters")]
    Unsafe { token: String },
    #[error("unexpected character '{ch}' at position {position}")]
    Malformed { ch: char, position: usize },
    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },
    #[error("unknown column `{name}`")]
    UnknownColumn { name: String },
    #[error("{0}")]
    Syntax(String),
}

impl RejectionReason {
    /// Safety violations are reported differently from plain typos.
    pub fn is_safety_violation(&self) -> bool {
        matches!(self, RejectionReason::Unsafe { .. })
    }
}

/// Failure to produce a usable dataset from an upload.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("required structure column `{0}` not found")]
    MissingStructureColumn(String),
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("no records found in {}", .0.display())]
    Empty(PathBuf),
    #[error("malformed SDF record {record}: {message}")]
    Sdf { record: usize, message: String },
    #[error("schema mismatch: {0}")]
    Schema(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] polars::prelude::PolarsError),
}

/// A single row's structure encoding could not be turned into an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("empty structure encoding")]
    Empty,
    #[error("invalid SMILES at position {position}: {message}")]
    Smiles { position: usize, message: String },
    #[error("invalid molblock: {0}")]
    Molblock(String),
}
