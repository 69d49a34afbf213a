//! Data model for cohort submissions.
//!
//! Definitions describe file types, results describe what validation found,
//! and submissions track versioned files through their acknowledgment cycle.

pub mod definition;
pub mod error;
pub mod ids;
pub mod result;
pub mod submission;

pub use definition::{
    ColumnDefinition, ColumnType, DEFAULT_DATE_FORMAT, Definition, DefinitionSet,
    ValidationParams,
};
pub use error::{ModelError, Result};
pub use ids::{FileId, SubmissionId, SubmissionKey, TaskId};
pub use result::{
    ALL_VALID_MESSAGE, CardinalityClass, CatalogEntry, ColumnReport, ColumnStats,
    CrossFileWarning, FileValidationReport, InvalidRow, LoadStrategyKind, ValidationResult,
    ValidationSummary, ValidatorKind, percent,
};
pub use submission::{
    PatientIdUniverse, Submission, SubmissionFile, SubmissionStatus, TaskState, derive_status,
    effective_files,
};
