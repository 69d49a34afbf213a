//! Column validation, statistics and cross-file identifier checks.
//!
//! Validators run as set-based Polars queries against a loaded
//! [`cohort_ingest::TableHandle`]; no host-side row iteration is involved
//! beyond reading the bounded result frames.

pub mod checks;
pub mod cross_file;
pub mod engine;
pub mod error;
pub mod options;
pub mod stats;
pub mod util;

pub use checks::Validator;
pub use cross_file::{check_ids, extract_ids};
pub use engine::{ValidationEngine, validate_table};
pub use error::{Result, ValidatorError};
pub use options::ValidateOptions;
pub use stats::column_stats;
