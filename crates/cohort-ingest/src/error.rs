//! Error types for data ingestion.

use std::path::PathBuf;
use thiserror::Error;

use cohort_model::LoadStrategyKind;

/// Errors that abort a load. Row numbers are 1-based data rows; 0 is the header.
#[derive(Debug, Error)]
pub enum IngestError {
    // === Input Errors ===
    /// Upload contained no bytes.
    #[error("upload is empty")]
    EmptyInput,

    /// Failed to read an upload from disk.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Declared encoding label is unknown.
    #[error("unsupported encoding '{label}'")]
    UnsupportedEncoding { label: String },

    /// Bytes are not valid in the encoding.
    #[error("row {row}: bytes are not valid {encoding}")]
    Encoding { row: u64, encoding: &'static str },

    /// Delimiter is not a single ASCII character.
    #[error("invalid delimiter {0:?}")]
    InvalidDelimiter(char),

    // === Shape Errors ===
    /// Header row is missing or blank.
    #[error("header row is missing")]
    MissingHeader,

    /// Header cell is blank.
    #[error("header has a blank column name at position {position}")]
    BlankHeader { position: usize },

    /// Header names the same column twice.
    #[error("header names column '{column}' more than once")]
    DuplicateHeader { column: String },

    /// Declared column absent from the header.
    #[error("declared column '{column}' is missing from the header")]
    MissingColumn { column: String },

    /// Row has a different number of fields than the header.
    #[error("row {row}: expected {expected} columns, found {found}")]
    ColumnCountMismatch {
        row: u64,
        expected: usize,
        found: usize,
    },

    /// Empty line where a row or the header was expected.
    #[error("row {row}: blank line")]
    BlankLine { row: u64 },

    /// Delimited parsing failed.
    #[error("row {row}: {message}")]
    Csv { row: u64, message: String },

    // === Engine Errors ===
    /// The query engine refused the input on the given strategy.
    #[error("{strategy} load rejected by the query engine: {message}")]
    EngineRejected {
        strategy: LoadStrategyKind,
        message: String,
    },

    /// Failed to write the spill file for a disk-backed load.
    #[error("failed to write spill file in {dir}: {source}")]
    Spill {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Whether the loader may retry this failure on the disk-backed strategy.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            IngestError::EngineRejected {
                strategy: LoadStrategyKind::InMemory,
                ..
            }
        )
    }

    /// Offending row, when the error names one.
    pub fn row(&self) -> Option<u64> {
        match self {
            IngestError::Encoding { row, .. }
            | IngestError::ColumnCountMismatch { row, .. }
            | IngestError::BlankLine { row }
            | IngestError::Csv { row, .. } => Some(*row),
            IngestError::BlankHeader { .. } | IngestError::DuplicateHeader { .. } => Some(0),
            _ => None,
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
