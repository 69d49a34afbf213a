//! Error types for the submission lifecycle.

use std::path::PathBuf;

use thiserror::Error;

use cohort_ingest::IngestError;
use cohort_model::{FileId, ModelError, TaskState};
use cohort_validate::ValidatorError;

/// Business-rule violations. Raised before any load or validation work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no definition for file type '{file_type}'")]
    UnknownFileType { file_type: String },

    #[error("'{file_type}' cannot be uploaded before the '{patient_file_type}' file")]
    PatientFileRequired {
        file_type: String,
        patient_file_type: String,
    },

    #[error("unknown submission {0}")]
    UnknownSubmission(String),

    #[error("unknown file {0}")]
    UnknownFile(FileId),

    #[error("file {file_id} failed to load and cannot be acknowledged")]
    LoadFailed { file_id: FileId },

    #[error("file {file_id} is still {state}")]
    NotCompleted { file_id: FileId, state: TaskState },

    #[error("file {file_id} version {version} is not the current version of '{file_type}'")]
    StaleVersion {
        file_id: FileId,
        file_type: String,
        version: u32,
    },
}

impl PreconditionError {
    /// Hint for resolving the violation, when there is an obvious one.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownFileType { .. } => {
                Some("Check the file type against the loaded definitions.".into())
            }
            Self::PatientFileRequired {
                patient_file_type, ..
            } => Some(format!("Upload the '{patient_file_type}' file first.")),
            Self::LoadFailed { .. } => Some("Fix the file and upload a new version.".into()),
            Self::NotCompleted { .. } => Some("Wait for the load to finish.".into()),
            Self::StaleVersion { file_type, .. } => {
                Some(format!("Acknowledge the latest version of '{file_type}'."))
            }
            Self::UnknownSubmission(_) | Self::UnknownFile(_) => None,
        }
    }
}

/// Errors from submission operations and the load pipeline.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    /// Patient file holds more identifiers than the configured bound.
    #[error("patient file has {count} identifiers, limit is {limit}")]
    IdentifierLimit { count: usize, limit: usize },

    /// Patient file lacks its identifier column.
    #[error("patient file has no identifier column '{column}'")]
    MissingIdentifierColumn { column: String },

    #[error("load task did not finish: {0}")]
    TaskAborted(String),

    #[error("unknown task {0}")]
    UnknownTask(cohort_model::TaskId),
}

impl SubmitError {
    pub fn is_precondition(&self) -> bool {
        matches!(self, SubmitError::Precondition(_))
    }
}

/// Errors loading configuration or definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse JSON {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported definition file {path} (expected .json or .toml)")]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    #[error("{path}: {source}")]
    Definition {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Result type for submission operations.
pub type Result<T> = std::result::Result<T, SubmitError>;
