//! Error types for validator execution.
//!
//! These are operational faults. Invalid values are not errors; they come
//! back as a [`cohort_model::ValidationResult`] with `valid == false`.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Validated column is not in the table.
    #[error("column '{column}' is not in the table")]
    MissingColumn { column: String },

    /// Pattern parameter failed to compile.
    #[error("column '{column}': invalid pattern: {message}")]
    InvalidPattern { column: String, message: String },

    /// The query engine failed while executing a validator.
    #[error("column '{column}': query failed: {message}")]
    Query { column: String, message: String },

    /// Failed to build the column worker pool.
    #[error("failed to build validation thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

impl ValidatorError {
    pub(crate) fn query(column: &str) -> impl FnOnce(PolarsError) -> ValidatorError + '_ {
        move |err| ValidatorError::Query {
            column: column.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for validator operations.
pub type Result<T> = std::result::Result<T, ValidatorError>;
