//! Column validators.
//!
//! Every validator describes its offending rows as a list of [`Offense`]
//! expressions. [`evaluate`] turns them into one set-based query per
//! result: a per-row sub-kind column, filtered to offending rows, then
//! grouped for the sub-kind breakdown and the invalid catalog.

mod boolean;
mod date;
mod enumeration;
mod id;
mod numeric;
mod required;
mod string;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use polars::prelude::*;
use regex::Regex;
use tracing::trace;

use cohort_ingest::{ROW_NUMBER_COLUMN, TableHandle};
use cohort_model::{
    CatalogEntry, ColumnDefinition, ColumnType, InvalidRow, ValidationResult, ValidationSummary,
    ValidatorKind,
};

use crate::error::{Result, ValidatorError};
use crate::options::ValidateOptions;
use crate::util::{anchored, join_parts};

const ROW: &str = "row_number";
const VALUE: &str = "value";
const KIND: &str = "kind";
const COUNT: &str = "count";

/// One sub-kind of offending value.
pub(crate) struct Offense {
    code: &'static str,
    singular: String,
    plural: String,
    condition: Expr,
}

impl Offense {
    pub(crate) fn new(
        code: &'static str,
        singular: impl Into<String>,
        plural: impl Into<String>,
        condition: Expr,
    ) -> Self {
        Self {
            code,
            singular: singular.into(),
            plural: plural.into(),
            condition,
        }
    }

    fn describe(&self, count: u64) -> String {
        let label = if count == 1 {
            &self.singular
        } else {
            &self.plural
        };
        format!("{count} {label}")
    }
}

/// The closed set of column validators.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Required,
    StringType {
        max_length: Option<u32>,
        pattern: Option<String>,
    },
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
        integer_only: bool,
    },
    Date {
        format: String,
        min_date: Option<NaiveDate>,
        max_date: Option<NaiveDate>,
    },
    Boolean {
        /// Lowercased accepted tokens.
        tokens: Vec<String>,
    },
    Enum {
        allowed_values: Vec<String>,
        case_sensitive: bool,
    },
    Id {
        pattern: Option<String>,
        unique: bool,
    },
}

impl Validator {
    /// Type validator for a declared column.
    pub fn for_type(column: &ColumnDefinition) -> Self {
        let params = &column.params;
        match column.column_type {
            ColumnType::String => Validator::StringType {
                max_length: params.max_length,
                pattern: params.pattern.clone(),
            },
            ColumnType::Numeric | ColumnType::Integer => Validator::Numeric {
                min: params.min,
                max: params.max,
                integer_only: params.integer_only || column.column_type == ColumnType::Integer,
            },
            ColumnType::Date => Validator::Date {
                format: params.date_format().to_string(),
                min_date: params.min_date,
                max_date: params.max_date,
            },
            ColumnType::Boolean => Validator::Boolean {
                tokens: params.boolean_tokens(),
            },
            ColumnType::Enum => Validator::Enum {
                allowed_values: params.allowed_values.clone(),
                case_sensitive: params.case_sensitive(),
            },
            ColumnType::Id => Validator::Id {
                pattern: params.pattern.clone(),
                unique: params.unique(),
            },
        }
    }

    /// Validators for a declared column: Required first when flagged, then the type validator.
    pub fn for_column(column: &ColumnDefinition) -> Vec<Self> {
        let mut validators = Vec::with_capacity(2);
        if column.required {
            validators.push(Validator::Required);
        }
        validators.push(Self::for_type(column));
        validators
    }

    pub fn kind(&self) -> ValidatorKind {
        match self {
            Validator::Required => ValidatorKind::Required,
            Validator::StringType { .. } => ValidatorKind::StringType,
            Validator::Numeric { .. } => ValidatorKind::Numeric,
            Validator::Date { .. } => ValidatorKind::Date,
            Validator::Boolean { .. } => ValidatorKind::Boolean,
            Validator::Enum { .. } => ValidatorKind::Enum,
            Validator::Id { .. } => ValidatorKind::Id,
        }
    }

    /// Run this validator against `column` of `table`.
    ///
    /// Offending values produce a result with `valid == false`; only a
    /// failure to run the query is an error.
    pub fn validate(
        &self,
        table: &TableHandle,
        column: &str,
        options: &ValidateOptions,
    ) -> Result<ValidationResult> {
        if !table.has_column(column) {
            return Err(ValidatorError::MissingColumn {
                column: column.to_string(),
            });
        }
        let offenses = match self {
            Validator::Required => required::offenses(column),
            Validator::StringType {
                max_length,
                pattern,
            } => string::offenses(column, *max_length, checked_pattern(column, pattern.as_deref())?),
            Validator::Numeric {
                min,
                max,
                integer_only,
            } => numeric::offenses(column, *min, *max, *integer_only),
            Validator::Date {
                format,
                min_date,
                max_date,
            } => date::offenses(column, format, *min_date, *max_date),
            Validator::Boolean { tokens } => boolean::offenses(column, tokens),
            Validator::Enum {
                allowed_values,
                case_sensitive,
            } => enumeration::offenses(column, allowed_values, *case_sensitive),
            Validator::Id { pattern, unique } => {
                id::offenses(column, checked_pattern(column, pattern.as_deref())?, *unique)
            }
        };
        evaluate(table, column, self.kind(), &offenses, options)
    }
}

/// Anchor a pattern and make sure it compiles before it reaches a query.
fn checked_pattern(column: &str, pattern: Option<&str>) -> Result<Option<String>> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };
    let anchored = anchored(pattern);
    Regex::new(&anchored).map_err(|e| ValidatorError::InvalidPattern {
        column: column.to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(anchored))
}

fn evaluate(
    table: &TableHandle,
    column: &str,
    validator: ValidatorKind,
    offenses: &[Offense],
    options: &ValidateOptions,
) -> Result<ValidationResult> {
    let total_rows = table.row_count();
    if offenses.is_empty() || total_rows == 0 {
        return Ok(ValidationResult::all_valid(validator, column, total_rows));
    }
    let started = Instant::now();
    let on_error = || ValidatorError::query(column);

    // Earlier offenses win when a row matches several.
    let kind_expr = offenses.iter().rev().fold(
        lit(NULL).cast(DataType::String),
        |otherwise, offense| {
            when(offense.condition.clone())
                .then(lit(offense.code))
                .otherwise(otherwise)
        },
    );
    let offending = table
        .lazy()
        .select([
            col(ROW_NUMBER_COLUMN).cast(DataType::UInt64).alias(ROW),
            col(column).alias(VALUE),
            kind_expr.alias(KIND),
        ])
        .filter(col(KIND).is_not_null());

    let breakdown = offending
        .clone()
        .group_by([col(KIND)])
        .agg([len().cast(DataType::UInt64).alias(COUNT)])
        .collect()
        .map_err(on_error())?;
    let counts = kind_counts(&breakdown).map_err(on_error())?;
    let invalid_count: u64 = counts.values().sum();
    if invalid_count == 0 {
        return Ok(ValidationResult::all_valid(validator, column, total_rows));
    }

    let sample = offending
        .clone()
        .sort_by_exprs([col(ROW)], SortMultipleOptions::default())
        .limit(to_idx(options.max_sample_rows))
        .collect()
        .map_err(on_error())?;
    let invalid_rows = sample_rows(&sample).map_err(on_error())?;

    let catalog = offending
        .group_by([col(VALUE)])
        .agg([len().cast(DataType::UInt64).alias(COUNT)])
        .sort_by_exprs(
            [col(COUNT), col(VALUE)],
            SortMultipleOptions::default()
                .with_order_descending_multi([true, false])
                .with_nulls_last(true),
        )
        .limit(to_idx(options.max_catalog_entries.saturating_add(1)))
        .collect()
        .map_err(on_error())?;
    let mut invalid_catalog = catalog_entries(&catalog).map_err(on_error())?;
    let catalog_truncated = invalid_catalog.len() > options.max_catalog_entries;
    invalid_catalog.truncate(options.max_catalog_entries);

    let parts: Vec<String> = offenses
        .iter()
        .filter_map(|offense| {
            let count = counts.get(offense.code).copied().unwrap_or(0);
            (count > 0).then(|| offense.describe(count))
        })
        .collect();

    trace!(
        column,
        validator = %validator,
        invalid_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "validator finished"
    );
    Ok(ValidationResult {
        validator,
        column: column.to_string(),
        valid: false,
        message: join_parts(&parts),
        invalid_rows,
        invalid_catalog,
        catalog_truncated,
        summary: ValidationSummary::new(invalid_count, total_rows),
    })
}

fn to_idx(n: usize) -> IdxSize {
    IdxSize::try_from(n).unwrap_or(IdxSize::MAX)
}

fn kind_counts(df: &DataFrame) -> PolarsResult<BTreeMap<String, u64>> {
    let kinds = df.column(KIND)?.str()?;
    let counts = df.column(COUNT)?.u64()?;
    Ok(kinds
        .into_iter()
        .zip(counts)
        .filter_map(|(kind, count)| Some((kind?.to_string(), count.unwrap_or(0))))
        .collect())
}

fn sample_rows(df: &DataFrame) -> PolarsResult<Vec<InvalidRow>> {
    let rows = df.column(ROW)?.u64()?;
    let values = df.column(VALUE)?.str()?;
    let kinds = df.column(KIND)?.str()?;
    Ok(rows
        .into_iter()
        .zip(values)
        .zip(kinds)
        .map(|((row, value), kind)| InvalidRow {
            row_number: row.unwrap_or(0),
            value: value.map(str::to_string),
            kind: kind.unwrap_or_default().to_string(),
        })
        .collect())
}

fn catalog_entries(df: &DataFrame) -> PolarsResult<Vec<CatalogEntry>> {
    let values = df.column(VALUE)?.str()?;
    let counts = df.column(COUNT)?.u64()?;
    Ok(values
        .into_iter()
        .zip(counts)
        .map(|(value, count)| CatalogEntry {
            value: value.map(str::to_string),
            count: count.unwrap_or(0),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_model::ValidationParams;

    #[test]
    fn required_comes_before_type_validator() {
        let column = ColumnDefinition::new("dob", ColumnType::Date).required();
        let kinds: Vec<ValidatorKind> = Validator::for_column(&column)
            .iter()
            .map(Validator::kind)
            .collect();
        assert_eq!(kinds, vec![ValidatorKind::Required, ValidatorKind::Date]);
    }

    #[test]
    fn integer_type_maps_to_integer_only_numeric() {
        let column = ColumnDefinition::new("age", ColumnType::Integer).with_params(
            ValidationParams {
                min: Some(0.0),
                ..ValidationParams::default()
            },
        );
        assert_eq!(
            Validator::for_type(&column),
            Validator::Numeric {
                min: Some(0.0),
                max: None,
                integer_only: true
            }
        );
    }

    #[test]
    fn offense_describe_pluralizes() {
        let offense = Offense::new("null", "null value", "null values", lit(true));
        assert_eq!(offense.describe(1), "1 null value");
        assert_eq!(offense.describe(12), "12 null values");
    }
}
