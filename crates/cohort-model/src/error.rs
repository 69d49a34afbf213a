use thiserror::Error;

/// Errors raised while building or checking model values.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid cohort: {0:?}")]
    InvalidCohort(String),
    #[error("invalid reporting period: {0:?}")]
    InvalidPeriod(String),
    #[error("invalid file type: {0:?}")]
    InvalidFileType(String),

    // === Definition checks ===
    #[error("definition '{file_type}' has no columns")]
    EmptyDefinition { file_type: String },
    #[error("definition '{file_type}' declares column '{column}' more than once")]
    DuplicateColumn { file_type: String, column: String },
    #[error("definition '{file_type}' has a blank column name at position {position}")]
    BlankColumn { file_type: String, position: usize },
    #[error("column '{column}' has an invalid pattern: {message}")]
    InvalidPattern { column: String, message: String },
    #[error("column '{column}' has invalid parameters: {reason}")]
    InvalidParams { column: String, reason: String },
    #[error("id column '{column}' is not declared in definition '{file_type}'")]
    UnknownIdColumn { file_type: String, column: String },
    #[error("file type '{0}' is defined more than once")]
    DuplicateFileType(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
