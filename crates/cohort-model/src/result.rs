//! Validation results and column statistics exposed to reporting layers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::definition::ColumnType;

/// Message attached to a column without offending rows.
pub const ALL_VALID_MESSAGE: &str = "All values are valid";

/// Percentage of `part` in `total`, rounded to one decimal. Zero when `total` is zero.
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Name tag of a validator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Required,
    StringType,
    Numeric,
    Date,
    Boolean,
    Enum,
    Id,
}

impl ValidatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::Required => "required",
            ValidatorKind::StringType => "string_type",
            ValidatorKind::Numeric => "numeric",
            ValidatorKind::Date => "date",
            ValidatorKind::Boolean => "boolean",
            ValidatorKind::Enum => "enum",
            ValidatorKind::Id => "id",
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One offending row as selected by a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidRow {
    /// 1-based data row number.
    pub row_number: u64,
    /// Raw cell value; `None` for a null cell.
    pub value: Option<String>,
    /// Sub-kind code, e.g. `empty_string`.
    pub kind: String,
}

/// A distinct offending value with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub value: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows: u64,
    pub invalid_count: u64,
    pub valid_count: u64,
    pub invalid_percent: f64,
}

impl ValidationSummary {
    pub fn new(invalid_count: u64, total_rows: u64) -> Self {
        Self {
            total_rows,
            invalid_count,
            valid_count: total_rows.saturating_sub(invalid_count),
            invalid_percent: percent(invalid_count, total_rows),
        }
    }
}

/// Standardized outcome of one validator run on one column.
///
/// `valid == false` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validator: ValidatorKind,
    pub column: String,
    pub valid: bool,
    pub message: String,
    pub invalid_rows: Vec<InvalidRow>,
    pub invalid_catalog: Vec<CatalogEntry>,
    /// Set when the catalog hit its size cap.
    pub catalog_truncated: bool,
    pub summary: ValidationSummary,
}

impl ValidationResult {
    /// Result for a column without offending rows.
    pub fn all_valid(validator: ValidatorKind, column: impl Into<String>, total_rows: u64) -> Self {
        Self {
            validator,
            column: column.into(),
            valid: true,
            message: ALL_VALID_MESSAGE.to_string(),
            invalid_rows: Vec::new(),
            invalid_catalog: Vec::new(),
            catalog_truncated: false,
            summary: ValidationSummary::new(0, total_rows),
        }
    }
}

/// Uniqueness bucket of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardinalityClass {
    Low,
    Medium,
    High,
}

impl CardinalityClass {
    /// High above 90% unique, Medium above 1%, Low otherwise. Both bounds are exclusive.
    pub fn classify(unique_count: u64, total_rows: u64) -> Self {
        if total_rows == 0 {
            return CardinalityClass::Low;
        }
        // Integer comparisons keep the boundaries exact.
        let scaled = u128::from(unique_count) * 100;
        let total = u128::from(total_rows);
        if scaled > total * 90 {
            CardinalityClass::High
        } else if scaled > total {
            CardinalityClass::Medium
        } else {
            CardinalityClass::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardinalityClass::Low => "low",
            CardinalityClass::Medium => "medium",
            CardinalityClass::High => "high",
        }
    }
}

impl fmt::Display for CardinalityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary statistics of one loaded column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    /// Declared type; `None` for columns the definition does not mention.
    pub column_type: Option<ColumnType>,
    pub total_rows: u64,
    pub null_count: u64,
    pub null_percent: f64,
    pub unique_count: u64,
    pub unique_percent: f64,
    pub cardinality: CardinalityClass,
}

impl ColumnStats {
    pub fn new(
        column: impl Into<String>,
        column_type: Option<ColumnType>,
        total_rows: u64,
        null_count: u64,
        unique_count: u64,
    ) -> Self {
        Self {
            column: column.into(),
            column_type,
            total_rows,
            null_count,
            null_percent: percent(null_count, total_rows),
            unique_count,
            unique_percent: percent(unique_count, total_rows),
            cardinality: CardinalityClass::classify(unique_count, total_rows),
        }
    }
}

/// Identifiers of a file that are absent from the patient universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossFileWarning {
    pub column: String,
    pub unknown_count: u64,
    /// Sorted, bounded sample of unknown identifiers.
    pub sample: Vec<String>,
    pub message: String,
}

/// Strategy the loader used for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategyKind {
    InMemory,
    DiskBacked,
}

impl LoadStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStrategyKind::InMemory => "in_memory",
            LoadStrategyKind::DiskBacked => "disk_backed",
        }
    }
}

impl fmt::Display for LoadStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results for one declared column, in validator order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReport {
    pub column: String,
    pub results: Vec<ValidationResult>,
}

impl ColumnReport {
    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|result| result.valid)
    }
}

/// Everything the engine learned about one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileValidationReport {
    pub file_type: String,
    pub row_count: u64,
    pub strategy: LoadStrategyKind,
    /// Set when the in-memory engine rejected the input and the disk path was used.
    pub fell_back: bool,
    pub columns: Vec<ColumnReport>,
    pub stats: Vec<ColumnStats>,
    pub warnings: Vec<CrossFileWarning>,
}

impl FileValidationReport {
    pub fn is_valid(&self) -> bool {
        self.columns.iter().all(ColumnReport::is_valid)
    }

    pub fn invalid_results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.columns
            .iter()
            .flat_map(|column| column.results.iter())
            .filter(|result| !result.valid)
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
